//! # Field Policy
//!
//! Typed form of the `x-encrypt` and `x-security` schema annotations.
//!
//! A schema's `properties` tree is compiled once into an [`ObjectPolicy`]
//! when the schema is registered or first used, so the security walkers
//! operate over a typed tree instead of re-inspecting untyped JSON on every
//! read and write.
//!
//! ## Annotation Format
//!
//! ```json
//! "costCenter": {
//!   "type": "string",
//!   "x-encrypt": true,
//!   "x-security": { "roles": ["FINANCE"], "onDeny": "MASK" }
//! }
//! ```
//!
//! Nesting follows the schema exactly: `type: "object"` with `properties`,
//! and `type: "array"` whose `items` declare `properties`.

use std::collections::BTreeMap;

use serde_json::Value;

/// Key of the encryption flag annotation.
pub const X_ENCRYPT: &str = "x-encrypt";

/// Key of the role-visibility annotation.
pub const X_SECURITY: &str = "x-security";

/// What happens to a field the caller may not see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenyAction {
    /// Replace the value with the mask literal.
    #[default]
    Mask,
    /// Delete the key from the result.
    Remove,
}

/// Role allowlist for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    /// Roles allowed to see the real value.
    pub roles: Vec<String>,
    /// Behavior for everyone else.
    pub on_deny: DenyAction,
}

/// Nested structure below a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NestedPolicy {
    /// Scalar or unannotated structure.
    #[default]
    None,
    /// `type: object` with `properties`.
    Object(ObjectPolicy),
    /// `type: array` whose `items` declare `properties`.
    Array(ObjectPolicy),
}

/// Policy for a single property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPolicy {
    /// Value is stored encrypted.
    pub encrypt: bool,
    /// Value is visible only to some roles.
    pub access: Option<AccessRule>,
    /// Policies of nested properties.
    pub nested: NestedPolicy,
}

impl FieldPolicy {
    fn is_inert(&self) -> bool {
        !self.encrypt && self.access.is_none() && matches!(self.nested, NestedPolicy::None)
    }
}

/// Policies of the properties of one object level. Properties with no
/// annotations anywhere in their subtree are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectPolicy {
    fields: BTreeMap<String, FieldPolicy>,
}

impl ObjectPolicy {
    /// Compile the policy of a whole schema definition.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed annotation, prefixed
    /// with its JSON Pointer location in the schema.
    pub fn from_definition(definition: &Value) -> Result<Self, String> {
        compile_object(definition, "")
    }

    /// Iterate over `(property name, policy)` pairs.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldPolicy)> {
        self.fields.iter()
    }

    /// Policy of one property, if it has any.
    pub fn field(&self, name: &str) -> Option<&FieldPolicy> {
        self.fields.get(name)
    }

    /// True when nothing in the schema is encrypted or restricted.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of encrypted properties at this level.
    pub fn encrypted_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, p)| p.encrypt)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

fn compile_object(schema: &Value, path: &str) -> Result<ObjectPolicy, String> {
    let mut policy = ObjectPolicy::default();
    let properties = match schema.get("properties") {
        None => return Ok(policy),
        Some(Value::Object(props)) => props,
        Some(_) => return Err(format!("{path}/properties: must be an object")),
    };

    for (name, prop) in properties {
        let field_path = format!("{path}/properties/{name}");

        let encrypt = match prop.get(X_ENCRYPT) {
            None => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(format!("{field_path}: {X_ENCRYPT} must be a boolean")),
        };

        let access = match prop.get(X_SECURITY) {
            None => None,
            Some(rule) => Some(compile_access_rule(rule, &field_path)?),
        };

        let nested = match prop.get("type").and_then(Value::as_str) {
            Some("object") if prop.get("properties").is_some() => {
                NestedPolicy::Object(compile_object(prop, &field_path)?)
            }
            Some("array") => match prop.get("items") {
                Some(items) if items.get("properties").is_some() => {
                    NestedPolicy::Array(compile_object(items, &format!("{field_path}/items"))?)
                }
                _ => NestedPolicy::None,
            },
            _ => NestedPolicy::None,
        };

        if encrypt && !matches!(nested, NestedPolicy::None) {
            return Err(format!(
                "{field_path}: {X_ENCRYPT} applies to scalar fields, not to nested objects or arrays"
            ));
        }

        let field = FieldPolicy {
            encrypt,
            access,
            nested,
        };
        if !field.is_inert() {
            policy.fields.insert(name.clone(), field);
        }
    }

    // Nested policies that turned out empty carry no information.
    for field in policy.fields.values_mut() {
        if let NestedPolicy::Object(p) | NestedPolicy::Array(p) = &field.nested {
            if p.is_empty() {
                field.nested = NestedPolicy::None;
            }
        }
    }
    policy.fields.retain(|_, f| !f.is_inert());

    Ok(policy)
}

fn compile_access_rule(rule: &Value, path: &str) -> Result<AccessRule, String> {
    let rule = rule
        .as_object()
        .ok_or_else(|| format!("{path}: {X_SECURITY} must be an object"))?;

    let roles = match rule.get("roles") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|r| {
                r.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("{path}: {X_SECURITY}.roles must contain strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(format!("{path}: {X_SECURITY}.roles must be an array")),
    };

    let on_deny = match rule.get("onDeny") {
        None | Some(Value::Null) => DenyAction::Mask,
        Some(Value::String(s)) if s == "MASK" => DenyAction::Mask,
        Some(Value::String(s)) if s == "REMOVE" => DenyAction::Remove,
        Some(other) => {
            return Err(format!(
                "{path}: {X_SECURITY}.onDeny must be \"MASK\" or \"REMOVE\", got {other}"
            ))
        }
    };

    Ok(AccessRule { roles, on_deny })
}
