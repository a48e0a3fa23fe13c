//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers the engine passes around. They
//! prevent accidental identifier confusion; you cannot pass a column name
//! where a schema code is expected.
//!
//! ## Security Invariant
//!
//! [`SqlIdentifier`] and [`JsonPath`] are the only values interpolated into
//! SQL text (table names, column names, index names, `JSON_EXTRACT` paths).
//! Their constructors reject anything that could terminate an identifier or
//! a quoted literal, so statement builders never have to escape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IdentifierError;

/// Maximum length of a schema code (matches the `schema_code` column width).
pub const MAX_SCHEMA_CODE_LEN: usize = 100;

/// Maximum identifier length accepted by MariaDB/MySQL.
pub const MAX_SQL_IDENTIFIER_LEN: usize = 64;

// ─── SchemaCode ─────────────────────────────────────────────────────

/// Stable logical name of a schema family, e.g. `RFA_DWG_V1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SchemaCode(String);

impl SchemaCode {
    /// Validate and wrap a schema code.
    ///
    /// Accepts 1–100 characters from `[A-Za-z0-9_.-]`.
    pub fn new(code: impl Into<String>) -> Result<Self, IdentifierError> {
        let code = code.into();
        let reject = |reason: &str| IdentifierError::InvalidSchemaCode {
            value: code.clone(),
            reason: reason.to_string(),
        };
        if code.is_empty() {
            return Err(reject("must not be empty"));
        }
        if code.len() > MAX_SCHEMA_CODE_LEN {
            return Err(reject("longer than 100 characters"));
        }
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(reject("only letters, digits, '_', '-' and '.' are allowed"));
        }
        Ok(Self(code))
    }

    /// Access the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SchemaCode {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for SchemaCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// ─── SchemaVersion ──────────────────────────────────────────────────

/// Positive schema version number. Version 1 is the first registration of
/// a code; each update adds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// The first version of every schema code.
    pub const FIRST: SchemaVersion = SchemaVersion(1);

    /// Validate and wrap a version number.
    pub fn new(version: i64) -> Result<Self, IdentifierError> {
        match u32::try_from(version) {
            Ok(v) if v >= 1 => Ok(Self(v)),
            _ => Err(IdentifierError::InvalidVersion(version)),
        }
    }

    /// The raw version number.
    pub fn get(self) -> u32 {
        self.0
    }

    /// The version after this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Iterate over the versions strictly after `self` up to and including
    /// `target`. Empty when `target <= self`.
    pub fn upgrade_path(self, target: SchemaVersion) -> impl Iterator<Item = SchemaVersion> {
        (self.0.saturating_add(1)..=target.0).map(SchemaVersion)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// ─── SqlIdentifier ──────────────────────────────────────────────────

/// A table, column, or index name that is safe to interpolate into SQL.
///
/// Must match `[A-Za-z_][A-Za-z0-9_]*` and be at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    /// Validate and wrap an identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        let reject = |reason: &str| IdentifierError::InvalidSqlIdentifier {
            value: name.clone(),
            reason: reason.to_string(),
        };
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(reject("must not be empty")),
            Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                return Err(reject("must start with a letter or '_'"))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(reject("only letters, digits and '_' are allowed"));
        }
        if name.len() > MAX_SQL_IDENTIFIER_LEN {
            return Err(reject("longer than 64 characters"));
        }
        Ok(Self(name))
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SqlIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for SqlIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// ─── JsonPath ───────────────────────────────────────────────────────

/// A MySQL/MariaDB JSON path expression such as `$.drawing.number` or
/// `$.items[0].code`, embedded inside a single-quoted literal in
/// `JSON_EXTRACT(details, '<path>')`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JsonPath(String);

impl JsonPath {
    /// Validate and wrap a JSON path.
    pub fn new(path: impl Into<String>) -> Result<Self, IdentifierError> {
        let path = path.into();
        let reject = |reason: &str| IdentifierError::InvalidJsonPath {
            value: path.clone(),
            reason: reason.to_string(),
        };
        if !path.starts_with('$') {
            return Err(reject("must start with '$'"));
        }
        if path.chars().any(|c| c == '\'' || c == '\\' || c.is_control()) {
            return Err(reject("quotes, backslashes and control characters are not allowed"));
        }
        Ok(Self(path))
    }

    /// Access the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JsonPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// ─── EntityRef ──────────────────────────────────────────────────────

/// A business row whose `details` payload is governed by a schema, e.g.
/// `rfa_revisions#42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Business table exposing `id`, `details` and `schema_version` columns.
    pub table: SqlIdentifier,
    /// Primary key of the row.
    pub id: i64,
}

impl EntityRef {
    /// Create an entity reference.
    pub fn new(table: SqlIdentifier, id: i64) -> Self {
        Self { table, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn schema_code_accepts_typical_codes() {
        for code in ["RFA_DWG_V1", "corr.body", "drawing-meta", "X"] {
            assert!(SchemaCode::new(code).is_ok(), "{code} should be accepted");
        }
    }

    #[test]
    fn schema_code_rejects_bad_input() {
        assert!(SchemaCode::new("").is_err());
        assert!(SchemaCode::new("has space").is_err());
        assert!(SchemaCode::new("quote'd").is_err());
        assert!(SchemaCode::new("x".repeat(101)).is_err());
    }

    #[test]
    fn schema_code_deserialize_validates() {
        let ok: SchemaCode = serde_json::from_str("\"RFA_DWG_V1\"").unwrap();
        assert_eq!(ok.as_str(), "RFA_DWG_V1");
        assert!(serde_json::from_str::<SchemaCode>("\"bad code\"").is_err());
    }

    #[test]
    fn schema_version_starts_at_one() {
        assert!(SchemaVersion::new(0).is_err());
        assert!(SchemaVersion::new(-3).is_err());
        assert_eq!(SchemaVersion::new(1).unwrap(), SchemaVersion::FIRST);
        assert_eq!(SchemaVersion::FIRST.next().get(), 2);
    }

    #[test]
    fn upgrade_path_is_exclusive_of_start_inclusive_of_target() {
        let from = SchemaVersion::new(2).unwrap();
        let to = SchemaVersion::new(5).unwrap();
        let path: Vec<u32> = from.upgrade_path(to).map(SchemaVersion::get).collect();
        assert_eq!(path, vec![3, 4, 5]);
        assert_eq!(to.upgrade_path(from).count(), 0);
        assert_eq!(to.upgrade_path(to).count(), 0);
    }

    #[test]
    fn sql_identifier_rules() {
        assert!(SqlIdentifier::new("rfa_revisions").is_ok());
        assert!(SqlIdentifier::new("_tmp1").is_ok());
        assert!(SqlIdentifier::new("1table").is_err());
        assert!(SqlIdentifier::new("rfa; DROP TABLE x").is_err());
        assert!(SqlIdentifier::new("a-b").is_err());
        assert!(SqlIdentifier::new("").is_err());
        assert!(SqlIdentifier::new("a".repeat(65)).is_err());
    }

    #[test]
    fn json_path_rules() {
        assert!(JsonPath::new("$.drawingNo").is_ok());
        assert!(JsonPath::new("$.items[0].code").is_ok());
        assert!(JsonPath::new("drawingNo").is_err());
        assert!(JsonPath::new("$.a') OR 1=1 --").is_err());
        assert!(JsonPath::new("$.a\\b").is_err());
    }

    #[test]
    fn entity_ref_display() {
        let e = EntityRef::new(SqlIdentifier::new("rfa_revisions").unwrap(), 42);
        assert_eq!(e.to_string(), "rfa_revisions#42");
    }

    proptest! {
        #[test]
        fn accepted_identifiers_never_contain_quotes(s in "\\PC{0,40}") {
            if let Ok(id) = SqlIdentifier::new(s) {
                prop_assert!(!id.as_str().contains('\''));
                prop_assert!(!id.as_str().contains('`'));
                prop_assert!(!id.as_str().contains(' '));
            }
        }
    }
}
