use super::{Descriptor, FieldOptions};
use crate::{Error, Result};

use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

/// Names an attribute may not take: they collide with the model façade's own
/// accessor surface.
const RESERVED_ATTR_NAMES: &[&str] = &[
    "get",
    "id",
    "increment_by",
    "is_new",
    "key",
    "model_type",
    "set",
    "snapshot",
    "unset",
    "validate",
];

/// Collection-name suffixes that are rejected as redundant.
const RESERVED_COLLECTION_SUFFIXES: &[&str] = &["Model", "Table", "Collection"];

/// A model's static declaration: collection name plus key-component and
/// data-field descriptors.
///
/// Compilation into a [`CompiledSchema`] is lazy, memoized on first use.
/// The computation is deterministic, so a racing first access resolves
/// idempotently without locking.
#[derive(Debug)]
pub struct ModelSchema {
    collection: String,
    key: IndexMap<String, Descriptor>,
    fields: IndexMap<String, Descriptor>,
    compiled: OnceLock<Result<Arc<CompiledSchema>>>,
}

/// The compiled form: sorted key order and merged per-attribute options
/// (key components first, then data fields in declaration order).
#[derive(Debug)]
pub struct CompiledSchema {
    collection: String,
    key_order: Vec<String>,
    attrs: IndexMap<String, Arc<FieldOptions>>,
}

impl ModelSchema {
    pub fn builder(collection: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            collection: collection.into(),
            key: IndexMap::new(),
            fields: IndexMap::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the compiled schema, compiling on first access.
    pub fn compiled(&self) -> Result<Arc<CompiledSchema>> {
        self.compiled.get_or_init(|| self.compile()).clone()
    }

    fn compile(&self) -> Result<Arc<CompiledSchema>> {
        validate_collection_name(&self.collection)?;

        if self.key.is_empty() {
            return Err(Error::invalid_parameter(format!(
                "model `{}` declares no key components",
                self.collection
            )));
        }

        let mut key_order: Vec<String> = self.key.keys().cloned().collect();
        key_order.sort();

        let mut attrs = IndexMap::with_capacity(self.key.len() + self.fields.len());
        for name in &key_order {
            let options = FieldOptions::compile(name, &self.key[name], true)?;
            attrs.insert(name.clone(), Arc::new(options));
        }
        for (name, descriptor) in &self.fields {
            if self.key.contains_key(name) {
                return Err(Error::invalid_parameter(format!(
                    "attribute `{name}` is declared as both a key component and a field"
                )));
            }
            let options = FieldOptions::compile(name, descriptor, false)?;
            attrs.insert(name.clone(), Arc::new(options));
        }

        for name in attrs.keys() {
            validate_attr_name(name)?;
        }

        Ok(Arc::new(CompiledSchema {
            collection: self.collection.clone(),
            key_order,
            attrs,
        }))
    }
}

/// Builder for a [`ModelSchema`].
#[derive(Debug)]
pub struct ModelSchemaBuilder {
    collection: String,
    key: IndexMap<String, Descriptor>,
    fields: IndexMap<String, Descriptor>,
}

impl ModelSchemaBuilder {
    /// Declares a key component.
    pub fn key(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.key.insert(name.into(), descriptor);
        self
    }

    /// Declares a non-key data field.
    pub fn field(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn build(self) -> ModelSchema {
        ModelSchema {
            collection: self.collection,
            key: self.key,
            fields: self.fields,
            compiled: OnceLock::new(),
        }
    }
}

impl CompiledSchema {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Key-component names in lexicographic order.
    pub fn key_order(&self) -> &[String] {
        &self.key_order
    }

    /// All attributes, key components first.
    pub fn attrs(&self) -> impl ExactSizeIterator<Item = &Arc<FieldOptions>> {
        self.attrs.values()
    }

    pub fn attr(&self, name: &str) -> Option<&Arc<FieldOptions>> {
        self.attrs.get(name)
    }

    /// Looks up an attribute, rejecting unknown names.
    pub fn require_attr(&self, name: &str) -> Result<&Arc<FieldOptions>> {
        self.attrs.get(name).ok_or_else(|| {
            Error::invalid_parameter(format!(
                "model `{}` has no attribute `{name}`",
                self.collection
            ))
        })
    }

    /// The sole key component, if the key has exactly one.
    pub fn sole_key(&self) -> Option<&Arc<FieldOptions>> {
        match &self.key_order[..] {
            [name] => self.attrs.get(name),
            _ => None,
        }
    }
}

fn validate_collection_name(name: &str) -> Result<()> {
    let starts_upper = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    if !starts_upper || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::invalid_parameter(format!(
            "collection name `{name}` must start with an uppercase letter and contain only letters and digits"
        )));
    }
    for suffix in RESERVED_COLLECTION_SUFFIXES {
        if name.len() > suffix.len() && name.ends_with(suffix) {
            return Err(Error::invalid_parameter(format!(
                "collection name `{name}` may not end in `{suffix}`"
            )));
        }
    }
    Ok(())
}

fn validate_attr_name(name: &str) -> Result<()> {
    if name.starts_with('_') {
        return Err(Error::invalid_parameter(format!(
            "attribute name `{name}` may not start with an underscore"
        )));
    }
    if RESERVED_ATTR_NAMES.contains(&name) {
        return Err(Error::invalid_parameter(format!(
            "attribute name `{name}` is reserved"
        )));
    }
    Ok(())
}
