//! # Security Context
//!
//! The caller's role set, supplied per request by the authentication layer.
//! Never persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Roles held by the caller of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// Role names, compared case-sensitively.
    pub user_roles: BTreeSet<String>,
}

impl SecurityContext {
    /// Build a context from any iterable of role names.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// A context with no roles.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether the caller holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.user_roles.contains(role)
    }

    /// Whether the caller holds any of `roles`.
    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a String>) -> bool {
        roles.into_iter().any(|r| self.user_roles.contains(r))
    }
}
