//! Handles that address documents without touching the store.

use crate::model_type::ModelType;

use vellum_core::{
    key::{encode_id, DocumentId},
    store::DocumentRef,
    value::Value,
    Error, Result,
};

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// A document's identity: model type, encoded identifier, and the key
/// components it was built from.
#[derive(Debug, Clone)]
pub struct Key {
    ty: Arc<ModelType>,
    id: DocumentId,
    components: IndexMap<String, Value>,
}

impl Key {
    pub(crate) fn of(ty: &Arc<ModelType>, input: Value) -> Result<Key> {
        let (components, rest) = split_attrs(ty, input)?;
        if let Some(name) = rest.keys().next() {
            return Err(Error::invalid_parameter(format!(
                "`{name}` is not a key component of `{}`",
                ty.collection()
            )));
        }
        Key::from_components(ty, components)
    }

    pub(crate) fn from_components(
        ty: &Arc<ModelType>,
        components: IndexMap<String, Value>,
    ) -> Result<Key> {
        let compiled = ty.compiled()?;
        let id = encode_id(&compiled, &components)?;
        Ok(Key {
            ty: ty.clone(),
            id,
            components,
        })
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.ty
    }

    pub fn collection(&self) -> &str {
        self.ty.collection()
    }

    /// The encoded document identifier.
    pub fn encoded_id(&self) -> &DocumentId {
        &self.id
    }

    pub fn components(&self) -> &IndexMap<String, Value> {
        &self.components
    }

    pub fn doc_ref(&self) -> DocumentRef {
        DocumentRef::new(self.ty.collection(), self.id.clone())
    }

    /// The canonical `collection/id` path.
    pub fn path(&self) -> String {
        self.doc_ref().path()
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ty.collection(), self.id)
    }
}

/// A [`Key`] plus initial values for non-key fields. `get_or_create`
/// materializes a missing document from these values.
#[derive(Debug, Clone)]
pub struct Data {
    key: Key,
    fields: IndexMap<String, Value>,
}

impl Data {
    pub(crate) fn of(ty: &Arc<ModelType>, values: Value) -> Result<Data> {
        let (components, fields) = split_attrs(ty, values)?;
        Ok(Data {
            key: Key::from_components(ty, components)?,
            fields,
        })
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub(crate) fn into_parts(self) -> (Key, IndexMap<String, Value>) {
        (self.key, self.fields)
    }
}

/// Splits an attribute map into (key components, remaining declared
/// attributes). A bare scalar is accepted as shorthand for the sole key
/// component. Unknown attribute names are rejected.
fn split_attrs(
    ty: &Arc<ModelType>,
    input: Value,
) -> Result<(IndexMap<String, Value>, IndexMap<String, Value>)> {
    let compiled = ty.compiled()?;

    let map = match input {
        Value::Object(map) => map,
        scalar => {
            let [name] = compiled.key_order() else {
                return Err(Error::invalid_parameter(format!(
                    "`{}` has a compound key; pass a component map",
                    ty.collection()
                )));
            };
            let mut components = IndexMap::with_capacity(1);
            components.insert(name.clone(), scalar);
            return Ok((components, IndexMap::new()));
        }
    };

    let mut components = IndexMap::new();
    let mut rest = IndexMap::new();
    for (name, value) in map {
        let attr = compiled.require_attr(&name)?;
        if attr.is_key() {
            components.insert(name, value);
        } else {
            rest.insert(name, value);
        }
    }
    Ok((components, rest))
}

/// An ordered list of keys, deduplicated by `(collection, encoded id)`.
/// First-seen order is preserved.
#[derive(Debug, Default)]
pub struct UniqueKeyList {
    seen: HashSet<(String, DocumentId)>,
    keys: Vec<Key>,
}

impl UniqueKeyList {
    pub fn new() -> UniqueKeyList {
        UniqueKeyList::default()
    }

    /// Adds a key; returns `true` if it was not already present.
    pub fn push(&mut self, key: Key) -> bool {
        let fingerprint = (key.collection().to_string(), key.encoded_id().clone());
        if !self.seen.insert(fingerprint) {
            return false;
        }
        self.keys.push(key);
        true
    }

    pub fn extend(&mut self, keys: impl IntoIterator<Item = Key>) {
        for key in keys {
            self.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    pub fn into_keys(self) -> Vec<Key> {
        self.keys
    }
}
