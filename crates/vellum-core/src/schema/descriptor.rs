use crate::{
    value::{TypeTag, Value},
    Error, Result,
};

/// A declarative field shape: type tag, optionality, mutability, default,
/// and value constraints.
///
/// Descriptors are plain data. They are consumed by
/// [`FieldOptions::compile`](super::FieldOptions::compile), which decides how
/// the declaring position (key component vs. data field) constrains them.
#[derive(Debug, Clone)]
pub struct Descriptor {
    tag: TypeTag,
    optional: bool,
    mutability: Mutability,
    default: Option<Value>,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    allowed: Option<Vec<Value>>,
}

/// Whether the declaring code marked the descriptor's mutability.
///
/// Data fields default to mutable; key components are immutable by
/// definition and reject an explicit `mutable()` marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mutability {
    Unspecified,
    Immutable,
    Mutable,
}

impl Descriptor {
    fn new(tag: TypeTag) -> Descriptor {
        Descriptor {
            tag,
            optional: false,
            mutability: Mutability::Unspecified,
            default: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            allowed: None,
        }
    }

    pub fn string() -> Descriptor {
        Descriptor::new(TypeTag::String)
    }

    pub fn integer() -> Descriptor {
        Descriptor::new(TypeTag::Integer)
    }

    pub fn number() -> Descriptor {
        Descriptor::new(TypeTag::Number)
    }

    pub fn boolean() -> Descriptor {
        Descriptor::new(TypeTag::Boolean)
    }

    pub fn array() -> Descriptor {
        Descriptor::new(TypeTag::Array)
    }

    pub fn object() -> Descriptor {
        Descriptor::new(TypeTag::Object)
    }

    /// Marks the field as optional; absent values pass validation.
    pub fn optional(mut self) -> Descriptor {
        self.optional = true;
        self
    }

    /// Marks the field immutable: once it holds a value, writes are rejected.
    pub fn immutable(mut self) -> Descriptor {
        self.mutability = Mutability::Immutable;
        self
    }

    /// Explicitly marks the field writable after its initial set.
    pub fn mutable(mut self) -> Descriptor {
        self.mutability = Mutability::Mutable;
        self
    }

    /// Declares a default, applied when the field is absent on create or on
    /// fetch of a required field.
    pub fn default_value(mut self, value: impl Into<Value>) -> Descriptor {
        self.default = Some(value.into());
        self
    }

    /// Inclusive lower bound for numeric values.
    pub fn min(mut self, min: impl Into<f64>) -> Descriptor {
        self.min = Some(min.into());
        self
    }

    /// Inclusive upper bound for numeric values.
    pub fn max(mut self, max: impl Into<f64>) -> Descriptor {
        self.max = Some(max.into());
        self
    }

    /// Minimum length for strings and arrays.
    pub fn min_length(mut self, len: usize) -> Descriptor {
        self.min_length = Some(len);
        self
    }

    /// Maximum length for strings and arrays.
    pub fn max_length(mut self, len: usize) -> Descriptor {
        self.max_length = Some(len);
        self
    }

    /// Restricts the value to a fixed set.
    pub fn allowed(mut self, values: impl IntoIterator<Item = Value>) -> Descriptor {
        self.allowed = Some(values.into_iter().collect());
        self
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(super) fn mutability(&self) -> Mutability {
        self.mutability
    }

    /// Validates `value` against this descriptor, `None` meaning absent.
    pub fn check(&self, field: &str, value: Option<&Value>) -> Result<()> {
        let Some(value) = value else {
            if self.optional {
                return Ok(());
            }
            return Err(Error::invalid_field(field, "is required"));
        };

        if value.is_null() {
            return Err(Error::invalid_field(field, "may not be null"));
        }

        if !self.tag.matches(value) {
            return Err(Error::invalid_field(
                field,
                format!("expected {} value, got {}", self.tag, shape_of(value)),
            ));
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min {
                if n < min {
                    return Err(Error::invalid_field(field, format!("must be >= {min}")));
                }
            }
            if let Some(max) = self.max {
                if n > max {
                    return Err(Error::invalid_field(field, format!("must be <= {max}")));
                }
            }
        }

        if let Some(len) = length_of(value) {
            if let Some(min) = self.min_length {
                if len < min {
                    return Err(Error::invalid_field(
                        field,
                        format!("length {len} is below the minimum of {min}"),
                    ));
                }
            }
            if let Some(max) = self.max_length {
                if len > max {
                    return Err(Error::invalid_field(
                        field,
                        format!("length {len} is above the maximum of {max}"),
                    ));
                }
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(Error::invalid_field(field, "value is not in the allowed set"));
            }
        }

        Ok(())
    }
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_rejects_absent() {
        let desc = Descriptor::string();
        let err = desc.check("name", None).unwrap_err();
        assert!(err.to_string().contains("is required"));
        assert!(desc.clone().optional().check("name", None).is_ok());
    }

    #[test]
    fn tag_mismatch() {
        let err = Descriptor::integer()
            .check("count", Some(&json!("three")))
            .unwrap_err();
        assert!(err.is_invalid_field());
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn numeric_bounds() {
        let desc = Descriptor::integer().min(0).max(10);
        assert!(desc.check("n", Some(&json!(0))).is_ok());
        assert!(desc.check("n", Some(&json!(-1))).is_err());
        assert!(desc.check("n", Some(&json!(11))).is_err());
    }

    #[test]
    fn string_length_bounds() {
        let desc = Descriptor::string().min_length(2).max_length(3);
        assert!(desc.check("s", Some(&json!("ab"))).is_ok());
        assert!(desc.check("s", Some(&json!("a"))).is_err());
        assert!(desc.check("s", Some(&json!("abcd"))).is_err());
    }

    #[test]
    fn allowed_set() {
        let desc = Descriptor::string().allowed([json!("red"), json!("blue")]);
        assert!(desc.check("color", Some(&json!("red"))).is_ok());
        assert!(desc.check("color", Some(&json!("green"))).is_err());
    }
}
