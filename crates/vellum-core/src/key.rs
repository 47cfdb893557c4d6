//! Deterministic encoding between a compound-key component map and the
//! single identifier the store addresses a document by.
//!
//! A sole integer-typed key component passes through as a native number.
//! Every other shape is encoded as the NUL-joined concatenation of the
//! components in sorted-name order: string components verbatim (embedded NUL
//! rejected), all other components as canonical JSON so that structurally
//! equal values always encode identically.

use crate::{
    schema::CompiledSchema,
    value::{canonical_json, TypeTag, Value},
    Error, Result,
};

use indexmap::IndexMap;

const SEPARATOR: char = '\u{0}';

/// The scalar a document is addressed by within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    I64(i64),
    Text(String),
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentId::I64(n) => write!(f, "{n}"),
            DocumentId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> DocumentId {
        DocumentId::I64(n)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> DocumentId {
        DocumentId::Text(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> DocumentId {
        DocumentId::Text(s.to_string())
    }
}

/// Encodes a full component map into the document identifier.
pub fn encode_id(
    schema: &CompiledSchema,
    components: &IndexMap<String, Value>,
) -> Result<DocumentId> {
    for name in components.keys() {
        let attr = schema.require_attr(name)?;
        if !attr.is_key() {
            return Err(Error::invalid_parameter(format!(
                "attribute `{name}` is not a key component"
            )));
        }
    }

    if let Some(attr) = schema.sole_key() {
        if attr.tag() == TypeTag::Integer {
            let value = components
                .get(attr.name())
                .ok_or_else(|| Error::invalid_field(attr.name(), "is required"))?;
            attr.validate(Some(value))?;
            let n = value.as_i64().ok_or_else(|| {
                Error::invalid_field(attr.name(), "integer key component is out of range")
            })?;
            return Ok(DocumentId::I64(n));
        }
    }

    let mut encoded = String::new();
    for (index, name) in schema.key_order().iter().enumerate() {
        let attr = schema.attr(name).unwrap();
        let value = components
            .get(name)
            .ok_or_else(|| Error::invalid_field(name.as_str(), "is required"))?;
        attr.validate(Some(value))?;

        if index > 0 {
            encoded.push(SEPARATOR);
        }
        match value {
            Value::String(s) => {
                if s.contains(SEPARATOR) {
                    return Err(Error::invalid_field(
                        name.as_str(),
                        "string key components may not contain NUL",
                    ));
                }
                encoded.push_str(s);
            }
            other => encoded.push_str(&canonical_json(other)),
        }
    }

    Ok(DocumentId::Text(encoded))
}

/// Decodes a document identifier back into its component map.
pub fn decode_id(schema: &CompiledSchema, id: &DocumentId) -> Result<IndexMap<String, Value>> {
    if let Some(attr) = schema.sole_key() {
        if attr.tag() == TypeTag::Integer {
            let value = match id {
                DocumentId::I64(n) => Value::from(*n),
                DocumentId::Text(s) => {
                    let n: i64 = s.parse().map_err(|_| {
                        Error::invalid_field(attr.name(), "identifier is not an integer")
                    })?;
                    Value::from(n)
                }
            };
            attr.validate(Some(&value))?;
            let mut components = IndexMap::with_capacity(1);
            components.insert(attr.name().to_string(), value);
            return Ok(components);
        }
    }

    let DocumentId::Text(encoded) = id else {
        return Err(Error::invalid_field(
            schema.key_order()[0].as_str(),
            "identifier must be a string for this key shape",
        ));
    };

    let pieces: Vec<&str> = encoded.split(SEPARATOR).collect();
    if pieces.len() != schema.key_order().len() {
        return Err(Error::invalid_field(
            schema.key_order()[0].as_str(),
            format!(
                "identifier has {} components, expected {}",
                pieces.len(),
                schema.key_order().len()
            ),
        ));
    }

    let mut components = IndexMap::with_capacity(pieces.len());
    for (name, piece) in schema.key_order().iter().zip(pieces) {
        let attr = schema.attr(name).unwrap();
        let value = if attr.tag() == TypeTag::String {
            Value::String(piece.to_string())
        } else {
            serde_json::from_str(piece).map_err(|err| {
                Error::invalid_field(name.as_str(), format!("unparseable component: {err}"))
            })?
        };
        attr.validate(Some(&value))?;
        components.insert(name.clone(), value);
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Descriptor, ModelSchema};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn compile(schema: ModelSchema) -> Arc<CompiledSchema> {
        schema.compiled().unwrap()
    }

    fn race_result() -> Arc<CompiledSchema> {
        compile(
            ModelSchema::builder("RaceResult")
                .key("raceID", Descriptor::integer())
                .key("runnerName", Descriptor::string())
                .build(),
        )
    }

    fn components(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn sole_integer_key_is_the_number() {
        let schema = compile(
            ModelSchema::builder("Counter")
                .key("seq", Descriptor::integer())
                .build(),
        );
        let id = encode_id(&schema, &components(&[("seq", json!(42))])).unwrap();
        assert_eq!(id, DocumentId::I64(42));
        assert_eq!(
            decode_id(&schema, &id).unwrap(),
            components(&[("seq", json!(42))])
        );
    }

    #[test]
    fn compound_key_is_nul_joined_in_sorted_order() {
        let schema = race_result();
        let id = encode_id(
            &schema,
            &components(&[("runnerName", json!("Joe")), ("raceID", json!(123))]),
        )
        .unwrap();
        assert_eq!(id, DocumentId::Text("123\u{0}Joe".to_string()));
    }

    #[test]
    fn round_trip_compound() {
        let schema = race_result();
        let original = components(&[("raceID", json!(7)), ("runnerName", json!("Ann"))]);
        let id = encode_id(&schema, &original).unwrap();
        let decoded = decode_id(&schema, &id).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn object_component_is_order_insensitive() {
        let schema = compile(
            ModelSchema::builder("Shard")
                .key("scope", Descriptor::object())
                .key("slot", Descriptor::integer())
                .build(),
        );
        let a = encode_id(
            &schema,
            &components(&[("scope", json!({"region": "eu", "zone": 2})), ("slot", json!(1))]),
        )
        .unwrap();
        let b = encode_id(
            &schema,
            &components(&[("scope", json!({"zone": 2, "region": "eu"})), ("slot", json!(1))]),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_nul_in_string_component() {
        let schema = race_result();
        let err = encode_id(
            &schema,
            &components(&[("raceID", json!(1)), ("runnerName", json!("Jo\u{0}e"))]),
        )
        .unwrap_err();
        assert!(err.is_invalid_field());
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn rejects_missing_and_non_key_components() {
        let schema = race_result();
        let err = encode_id(&schema, &components(&[("raceID", json!(1))])).unwrap_err();
        assert!(err.is_invalid_field());

        let err = encode_id(
            &schema,
            &components(&[
                ("raceID", json!(1)),
                ("runnerName", json!("Joe")),
                ("finish", json!(3)),
            ]),
        )
        .unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn decode_rejects_component_count_mismatch() {
        let schema = race_result();
        let err = decode_id(&schema, &DocumentId::Text("123".to_string())).unwrap_err();
        assert!(err.is_invalid_field());
        assert!(err.to_string().contains("expected 2"));
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_all_legal_keys(
            race_id in -1_000_000i64..=1_000_000,
            runner in "[a-zA-Z0-9 _.-]{1,32}",
        ) {
            let schema = race_result();
            let original = components(&[
                ("raceID", json!(race_id)),
                ("runnerName", json!(runner)),
            ]);
            let id = encode_id(&schema, &original).unwrap();
            let decoded = decode_id(&schema, &id).unwrap();
            prop_assert_eq!(decoded, original);
        }

        #[test]
        fn sole_integer_round_trip(seq in proptest::num::i64::ANY) {
            let schema = compile(
                ModelSchema::builder("Counter")
                    .key("seq", Descriptor::integer())
                    .build(),
            );
            let original = components(&[("seq", json!(seq))]);
            let id = encode_id(&schema, &original).unwrap();
            prop_assert_eq!(&id, &DocumentId::I64(seq));
            prop_assert_eq!(decode_id(&schema, &id).unwrap(), original);
        }
    }
}
