//! Helpers for the JSON values stored in document fields.

use crate::{Error, Result};

pub use serde_json::{Map, Number, Value};

use std::fmt::Write;

/// The six value shapes a field descriptor may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Array,
    Boolean,
    Integer,
    Number,
    Object,
    String,
}

impl TypeTag {
    /// Returns the tag's lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Array => "array",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::Object => "object",
            TypeTag::String => "string",
        }
    }

    /// Returns `true` if `value` is of this tag's shape.
    ///
    /// `integer` accepts only whole numbers; `number` accepts any numeric.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            TypeTag::Array => value.is_array(),
            TypeTag::Boolean => value.is_boolean(),
            TypeTag::Integer => value.is_i64() || value.is_u64(),
            TypeTag::Number => value.is_number(),
            TypeTag::Object => value.is_object(),
            TypeTag::String => value.is_string(),
        }
    }

    /// Returns `true` if this is a numeric tag (eligible for increments).
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Number)
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders a value as canonical JSON: object keys are emitted in
/// lexicographic order at every nesting level, with no whitespace.
///
/// Two structurally equal values always render identically, which makes the
/// rendering safe to embed in an encoded document identifier.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            // serde_json handles escaping; a string alone cannot fail.
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
    }
}

/// Adds two JSON numbers, staying integral when both sides are integral.
pub fn add_numbers(a: &Number, b: &Number) -> Result<Number> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let sum = a
            .checked_add(b)
            .ok_or_else(|| Error::invalid_parameter(format!("integer overflow: {a} + {b}")))?;
        return Ok(Number::from(sum));
    }

    let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
        return Err(Error::invalid_parameter("numbers are not addable"));
    };
    Number::from_f64(a + b)
        .ok_or_else(|| Error::invalid_parameter(format!("sum is not a finite number: {a} + {b}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_object_keys() {
        let a = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        let b = json!({"a": {"y": [1, 2], "z": true}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":{"y":[1,2],"z":true},"b":1}"#);
    }

    #[test]
    fn canonical_escapes_strings() {
        let v = json!({"s": "a\"b\u{0}"});
        assert_eq!(canonical_json(&v), "{\"s\":\"a\\\"b\\u0000\"}");
    }

    #[test]
    fn integer_tag_rejects_floats() {
        assert!(TypeTag::Integer.matches(&json!(3)));
        assert!(!TypeTag::Integer.matches(&json!(3.5)));
        assert!(TypeTag::Number.matches(&json!(3.5)));
    }

    #[test]
    fn add_numbers_stays_integral() {
        let sum = add_numbers(&Number::from(2), &Number::from(3)).unwrap();
        assert!(sum.is_i64());
        assert_eq!(sum.as_i64(), Some(5));

        let sum = add_numbers(&Number::from(2), &Number::from_f64(0.5).unwrap()).unwrap();
        assert_eq!(sum.as_f64(), Some(2.5));
    }
}
