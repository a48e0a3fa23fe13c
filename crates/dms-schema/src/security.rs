//! # Field Security Processor
//!
//! Applies a compiled [`ObjectPolicy`] to document data: encryption of
//! `x-encrypt` fields on write, and decryption plus role-based masking or
//! removal of `x-security` fields on read.
//!
//! ## Security Invariant
//!
//! Visibility is an allowlist. A restricted field is shown only when the
//! caller holds one of the rule's roles or the super-role. Decryption runs
//! before the access check, so a masked field never leaks ciphertext and a
//! removed field is never decrypted into the result.
//!
//! Both walks are total and pure: the input is never mutated, and values
//! that are neither objects nor arrays are returned verbatim.

use dms_core::SecurityContext;
use dms_crypto::Cipher;
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::policy::{AccessRule, DenyAction, NestedPolicy, ObjectPolicy};

/// Replacement for values the caller may not see.
pub const MASK_LITERAL: &str = "********";

/// Role that sees every field regardless of `x-security` rules.
pub const DEFAULT_SUPER_ROLE: &str = "SUPERADMIN";

/// Encrypts and filters document fields according to schema policy.
#[derive(Debug, Clone)]
pub struct FieldSecurityProcessor {
    cipher: Cipher,
    super_role: String,
}

impl FieldSecurityProcessor {
    /// A processor using `cipher` and the default super-role.
    pub fn new(cipher: Cipher) -> Self {
        Self {
            cipher,
            super_role: DEFAULT_SUPER_ROLE.to_string(),
        }
    }

    /// Override the super-role.
    pub fn with_super_role(mut self, role: impl Into<String>) -> Self {
        self.super_role = role.into();
        self
    }

    /// The configured super-role.
    pub fn super_role(&self) -> &str {
        &self.super_role
    }

    /// The cipher used for field encryption.
    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// Whether `ctx` may see a field guarded by `rule`.
    pub fn is_authorized(&self, rule: &AccessRule, ctx: &SecurityContext) -> bool {
        ctx.has_role(&self.super_role) || ctx.has_any_role(&rule.roles)
    }

    // ─── Write path ─────────────────────────────────────────────────

    /// Return a copy of `data` with every `x-encrypt` field encrypted.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Encryption`] when a flagged field cannot be encrypted
    /// (non-string value or AEAD failure). Nothing partially encrypted is
    /// returned.
    pub fn encrypt_fields(&self, data: &Value, policy: &ObjectPolicy) -> Result<Value, SchemaError> {
        match data {
            Value::Object(map) => Ok(Value::Object(self.encrypt_object(map, policy)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.encrypt_fields(item, policy))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn encrypt_object(
        &self,
        map: &Map<String, Value>,
        policy: &ObjectPolicy,
    ) -> Result<Map<String, Value>, SchemaError> {
        let mut out = map.clone();
        for (name, field) in policy.fields() {
            let Some(value) = out.get_mut(name) else {
                continue;
            };
            if field.encrypt {
                *value = self
                    .cipher
                    .encrypt_value(value)
                    .map_err(|source| SchemaError::Encryption {
                        field: name.clone(),
                        source,
                    })?;
                continue;
            }
            match (&field.nested, &*value) {
                (NestedPolicy::Object(inner), Value::Object(obj)) => {
                    *value = Value::Object(self.encrypt_object(obj, inner)?);
                }
                (NestedPolicy::Array(inner), Value::Array(_)) => {
                    *value = self.encrypt_fields(value, inner)?;
                }
                _ => {}
            }
        }
        Ok(out)
    }

    // ─── Read path ──────────────────────────────────────────────────

    /// Return a copy of `data` with `x-encrypt` fields decrypted (fail-open)
    /// and `x-security` fields masked or removed for unauthorized callers.
    pub fn decrypt_and_filter_fields(
        &self,
        data: &Value,
        policy: &ObjectPolicy,
        ctx: &SecurityContext,
    ) -> Value {
        match data {
            Value::Object(map) => Value::Object(self.filter_object(map, policy, ctx)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.decrypt_and_filter_fields(item, policy, ctx))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn filter_object(
        &self,
        map: &Map<String, Value>,
        policy: &ObjectPolicy,
        ctx: &SecurityContext,
    ) -> Map<String, Value> {
        let mut out = map.clone();
        for (name, field) in policy.fields() {
            if !out.contains_key(name) {
                continue;
            }

            if let Some(rule) = &field.access {
                if !self.is_authorized(rule, ctx) {
                    match rule.on_deny {
                        DenyAction::Remove => {
                            out.remove(name);
                        }
                        DenyAction::Mask => {
                            out.insert(name.clone(), Value::String(MASK_LITERAL.to_string()));
                        }
                    }
                    continue;
                }
            }

            let Some(value) = out.get_mut(name) else {
                continue;
            };
            if field.encrypt {
                *value = self.cipher.decrypt_value(value);
            }
            match (&field.nested, &*value) {
                (NestedPolicy::Object(inner), Value::Object(obj)) => {
                    *value = Value::Object(self.filter_object(obj, inner, ctx));
                }
                (NestedPolicy::Array(inner), Value::Array(_)) => {
                    *value = self.decrypt_and_filter_fields(value, inner, ctx);
                }
                _ => {}
            }
        }
        out
    }
}
