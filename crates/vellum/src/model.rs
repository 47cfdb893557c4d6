use crate::field::{Field, FieldInit};
use crate::handle::{Data, Key};
use crate::model_type::ModelType;

use vellum_core::{
    key::{encode_id, DocumentId},
    schema::CompiledSchema,
    store::{DocumentRef, FieldMap, WriteMap},
    value::{Map, Number, Value},
    Error, Result,
};

use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A handle to one tracked document within a context.
///
/// The façade is sealed: attributes are reachable only by their declared
/// names, through [`get`](Model::get) / [`set`](Model::set) and friends.
/// Handles are cheap to clone and may be held across awaits; the context
/// keeps one in the document's tracked slot and walks it at commit.
#[derive(Debug, Clone)]
pub struct Model {
    inner: Arc<Mutex<ModelState>>,
}

#[derive(Debug)]
pub(crate) struct ModelState {
    ty: Arc<ModelType>,
    compiled: Arc<CompiledSchema>,
    key: Key,
    fields: IndexMap<String, Field>,
    is_new: bool,
    is_partial: bool,
    is_set: bool,
}

/// What a snapshot reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    /// Report initial (load-time) values instead of current ones.
    pub initial: bool,
    /// Include the encoded identifier under the pseudo-attribute `_id`.
    pub include_id: bool,
    /// Leave the key components out.
    pub omit_key: bool,
}

/// Per-model before/after/diff snapshots, as three parallel arrays.
#[derive(Debug, Default)]
pub struct ModelDiffs {
    pub before: Vec<Value>,
    pub after: Vec<Value>,
    pub diff: Vec<Value>,
}

impl Model {
    /// A locally created document (`create` / `create_or_overwrite`).
    pub(crate) fn new_created(
        ty: &Arc<ModelType>,
        values: Value,
        overwrite: bool,
    ) -> Result<Model> {
        let data = ty.data(values)?;
        let (key, mut provided) = data.into_parts();
        let compiled = ty.compiled()?;

        let mut fields = IndexMap::with_capacity(compiled.attrs().len());
        for opts in compiled.attrs() {
            let init = if opts.is_key() {
                FieldInit::Created {
                    value: key.components().get(opts.name()).cloned(),
                }
            } else {
                let value = provided.shift_remove(opts.name()).filter(|v| !v.is_null());
                FieldInit::Created { value }
            };
            fields.insert(opts.name().to_string(), Field::new(opts.clone(), init));
        }

        let state = ModelState {
            ty: ty.clone(),
            compiled,
            key,
            fields,
            is_new: true,
            is_partial: false,
            is_set: overwrite,
        };
        for field in state.fields.values() {
            field.validate()?;
        }
        Ok(Model::from_state(state))
    }

    /// A document materialized from a store snapshot (`get` hit).
    pub(crate) fn from_snapshot(key: Key, mut data: FieldMap) -> Result<Model> {
        let ty = key.model_type().clone();
        let compiled = ty.compiled()?;

        let mut fields = IndexMap::with_capacity(compiled.attrs().len());
        for opts in compiled.attrs() {
            let init = if opts.is_key() {
                FieldInit::Loaded {
                    stored: key.components().get(opts.name()).cloned(),
                }
            } else {
                FieldInit::Loaded {
                    stored: data.shift_remove(opts.name()),
                }
            };
            fields.insert(opts.name().to_string(), Field::new(opts.clone(), init));
        }

        Ok(Model::from_state(ModelState {
            ty,
            compiled,
            key,
            fields,
            is_new: false,
            is_partial: false,
            is_set: false,
        }))
    }

    /// A missing document materialized from a [`Data`] handle
    /// (`get_or_create` miss).
    pub(crate) fn from_data_missing(data: Data) -> Result<Model> {
        let ty = data.key().model_type().clone();
        let mut values = Map::new();
        for (name, value) in data.key().components() {
            values.insert(name.clone(), value.clone());
        }
        for (name, value) in data.fields() {
            values.insert(name.clone(), value.clone());
        }
        Model::new_created(&ty, Value::Object(values), false)
    }

    /// A partial document for a blind update (`update_without_read`).
    ///
    /// Skips defaults and validation of omitted attributes. Provided
    /// attributes count as written; an explicit `null` unsets the field.
    pub(crate) fn new_partial(ty: &Arc<ModelType>, values: Value) -> Result<Model> {
        let data = ty.data(values)?;
        let (key, mut provided) = data.into_parts();
        let compiled = ty.compiled()?;

        if provided.is_empty() {
            return Err(Error::model_operation(
                "update did not provide any data to change",
            ));
        }

        let mut fields = IndexMap::with_capacity(compiled.attrs().len());
        for opts in compiled.attrs() {
            let init = if opts.is_key() {
                FieldInit::Loaded {
                    stored: key.components().get(opts.name()).cloned(),
                }
            } else {
                match provided.shift_remove(opts.name()) {
                    Some(value) => {
                        if opts.is_immutable() {
                            return Err(Error::invalid_field(opts.name(), "is immutable"));
                        }
                        FieldInit::Written {
                            value: Some(value).filter(|v| !v.is_null()),
                        }
                    }
                    None => FieldInit::Untouched,
                }
            };
            fields.insert(opts.name().to_string(), Field::new(opts.clone(), init));
        }

        let state = ModelState {
            ty: ty.clone(),
            compiled,
            key,
            fields,
            is_new: false,
            is_partial: true,
            is_set: false,
        };
        state.validate_for_write()?;
        Ok(Model::from_state(state))
    }

    fn from_state(state: ModelState) -> Model {
        Model {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.inner.lock().unwrap()
    }

    /// Returns `true` when both handles refer to the same tracked instance.
    pub fn same_instance(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn model_type(&self) -> Arc<ModelType> {
        self.lock().ty.clone()
    }

    pub fn key(&self) -> Key {
        self.lock().key.clone()
    }

    /// `true` if this context will create the document rather than having
    /// read it from the store.
    pub fn is_new(&self) -> bool {
        self.lock().is_new
    }

    /// The encoded document identifier, recomputed from the current field
    /// values through the key codec.
    pub fn id(&self) -> Result<DocumentId> {
        let state = self.lock();
        let mut components = IndexMap::new();
        for name in state.compiled.key_order() {
            if let Some(value) = state.fields[name.as_str()].peek() {
                components.insert(name.clone(), value.clone());
            }
        }
        encode_id(&state.compiled, &components)
    }

    /// Reads an attribute; `None` means absent. Unknown names are rejected.
    pub fn get(&self, name: &str) -> Result<Option<Value>> {
        let mut state = self.lock();
        state.compiled.require_attr(name)?;
        Ok(state.fields[name].get())
    }

    /// Assigns an attribute. `null` is treated as unset.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut state = self.lock();
        state.compiled.require_attr(name)?;
        let value = Some(value.into()).filter(|v| !v.is_null());
        state.fields[name].set(value)
    }

    /// Unsets an attribute (permitted only for optional fields).
    pub fn unset(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.compiled.require_attr(name)?;
        state.fields[name].set(None)
    }

    /// Adds `delta` to a numeric attribute. While the stored value has not
    /// been observed, the change commits as an atomic server-side increment.
    pub fn increment_by(&self, name: &str, delta: impl Into<Number>) -> Result<()> {
        let mut state = self.lock();
        state.compiled.require_attr(name)?;
        state.fields[name].increment_by(delta.into())
    }

    /// Re-validates every attribute against its schema.
    pub fn validate(&self) -> Result<()> {
        self.lock().validate_for_write()
    }

    /// A plain map of attribute name to value. Never flips a field's
    /// read-access flag.
    pub fn snapshot(&self, options: SnapshotOptions) -> Result<Value> {
        Ok(self.lock().snapshot_map(options))
    }
}

impl ModelState {
    pub(crate) fn doc_ref(&self) -> DocumentRef {
        self.key.doc_ref()
    }

    pub(crate) fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn is_set(&self) -> bool {
        self.is_set
    }

    /// Whether commit must write this model.
    pub(crate) fn has_changes(&self, expect_writes: bool) -> bool {
        self.fields
            .values()
            .any(|field| field.has_changes_to_commit(expect_writes))
    }

    /// Validation before a write: everything for full documents, only the
    /// explicitly written attributes for partial ones.
    pub(crate) fn validate_for_write(&self) -> Result<()> {
        for field in self.fields.values() {
            if self.is_partial && !field.was_written() {
                continue;
            }
            field.validate()?;
        }
        Ok(())
    }

    /// The full wire document: non-key attributes only, absents omitted.
    pub(crate) fn serialize_full(&self) -> FieldMap {
        let mut data = FieldMap::new();
        for field in self.fields.values() {
            if field.options().is_key() {
                continue;
            }
            if let Some(value) = field.peek() {
                data.insert(field.name().to_string(), value.clone());
            }
        }
        data
    }

    /// The field-level update: changed non-key attributes as write
    /// expressions.
    pub(crate) fn serialize_update(&self) -> Result<WriteMap> {
        let mut changes = WriteMap::new();
        for field in self.fields.values() {
            if field.options().is_key() || !field.has_changes_to_commit(true) {
                continue;
            }
            if let Some(write) = field.write_value() {
                changes.insert(field.name().to_string(), write);
            }
        }
        if changes.is_empty() {
            return Err(Error::model_operation(
                "update did not provide any data to change",
            ));
        }
        Ok(changes)
    }

    /// Re-baselines every field after its write was dispatched.
    pub(crate) fn mark_flushed(&mut self) {
        for field in self.fields.values_mut() {
            field.mark_flushed();
        }
    }

    pub(crate) fn snapshot_map(&self, options: SnapshotOptions) -> Value {
        let mut map = Map::new();
        if options.include_id {
            map.insert("_id".to_string(), id_value(self.key.encoded_id()));
        }
        for field in self.fields.values() {
            if options.omit_key && field.options().is_key() {
                continue;
            }
            let value = if options.initial {
                field.initial()
            } else {
                field.peek()
            };
            if let Some(value) = value {
                map.insert(field.name().to_string(), value.clone());
            }
        }
        Value::Object(map)
    }

    /// Changed attributes as `{name: {before, after}}`.
    pub(crate) fn diff_map(&self) -> Value {
        let mut map = Map::new();
        for field in self.fields.values() {
            if !field.has_changes_to_commit(true) {
                continue;
            }
            let mut entry = Map::new();
            entry.insert(
                "before".to_string(),
                field.initial().cloned().unwrap_or(Value::Null),
            );
            entry.insert(
                "after".to_string(),
                field.peek().cloned().unwrap_or(Value::Null),
            );
            map.insert(field.name().to_string(), Value::Object(entry));
        }
        Value::Object(map)
    }
}

fn id_value(id: &DocumentId) -> Value {
    match id {
        DocumentId::I64(n) => Value::from(*n),
        DocumentId::Text(s) => Value::from(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vellum_core::schema::Descriptor;

    fn order() -> Arc<ModelType> {
        ModelType::builder("Order")
            .key("id", Descriptor::string())
            .field("product", Descriptor::string())
            .field("quantity", Descriptor::integer().min(0))
            .field("note", Descriptor::string().optional())
            .build()
    }

    fn config() -> Arc<ModelType> {
        ModelType::builder("Config")
            .key("id", Descriptor::string())
            .field("aNonNegInt", Descriptor::integer().min(0))
            .field(
                "immutableInt",
                Descriptor::integer().immutable().default_value(json!(5)),
            )
            .build()
    }

    #[test]
    fn create_validates_required_fields() {
        let err =
            Model::new_created(&order(), json!({"id": "A1", "product": "coffee"}), false)
                .unwrap_err();
        assert!(err.is_invalid_field());
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn create_applies_defaults() {
        let model = Model::new_created(
            &config(),
            json!({"id": "B", "aNonNegInt": 0}),
            false,
        )
        .unwrap();
        assert_eq!(model.get("immutableInt").unwrap(), Some(json!(5)));
        assert!(model.is_new());

        let data = model.lock().serialize_full();
        assert_eq!(data["aNonNegInt"], json!(0));
        assert_eq!(data["immutableInt"], json!(5));
        assert!(!data.contains_key("id"));
    }

    #[test]
    fn fetched_model_applies_default_for_missing_required_field() {
        let ty = config();
        let key = ty.key(json!("B")).unwrap();
        let model = Model::from_snapshot(
            key,
            [("aNonNegInt".to_string(), json!(0))].into_iter().collect(),
        )
        .unwrap();
        assert!(!model.is_new());
        assert_eq!(model.get("immutableInt").unwrap(), Some(json!(5)));

        let err = model.set("immutableInt", json!(6)).unwrap_err();
        assert!(err.to_string().contains("is immutable"));
    }

    #[test]
    fn facade_is_sealed() {
        let model =
            Model::new_created(&order(), json!({"id": "A1", "product": "x", "quantity": 1}), false)
                .unwrap();
        assert!(model.get("unknown").is_err());
        assert!(model.set("unknown", json!(1)).is_err());
    }

    #[test]
    fn id_recomputes_through_the_codec() {
        let ty = ModelType::builder("RaceResult")
            .key("raceID", Descriptor::integer())
            .key("runnerName", Descriptor::string())
            .field("finish", Descriptor::integer().optional())
            .build();
        let model = Model::new_created(
            &ty,
            json!({"raceID": 123, "runnerName": "Joe"}),
            false,
        )
        .unwrap();
        assert_eq!(
            model.id().unwrap(),
            DocumentId::Text("123\u{0}Joe".to_string())
        );
    }

    #[test]
    fn snapshot_does_not_flip_read_flags() {
        let ty = order();
        let key = ty.key(json!("A1")).unwrap();
        let model = Model::from_snapshot(
            key,
            [
                ("product".to_string(), json!("coffee")),
                ("quantity".to_string(), json!(2)),
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();

        let snap = model.snapshot(SnapshotOptions::default()).unwrap();
        assert_eq!(snap["product"], json!("coffee"));
        assert_eq!(snap["id"], json!("A1"));

        // The snapshot did not count as a read: increments still
        // accumulate as server-side increments.
        model.increment_by("quantity", 1).unwrap();
        let changes = model.lock().serialize_update().unwrap();
        assert!(matches!(
            changes["quantity"],
            vellum_core::store::WriteValue::Increment(_)
        ));
    }

    #[test]
    fn snapshot_variants() {
        let ty = order();
        let key = ty.key(json!("A1")).unwrap();
        let model = Model::from_snapshot(
            key,
            [
                ("product".to_string(), json!("tea")),
                ("quantity".to_string(), json!(1)),
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();
        model.set("quantity", json!(3)).unwrap();

        let initial = model
            .snapshot(SnapshotOptions {
                initial: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(initial["quantity"], json!(1));

        let current = model
            .snapshot(SnapshotOptions {
                omit_key: true,
                include_id: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(current["quantity"], json!(3));
        assert_eq!(current["_id"], json!("A1"));
        assert!(current.get("id").is_none());
    }

    #[test]
    fn partial_model_requires_changes_and_respects_immutability() {
        let err = Model::new_partial(&config(), json!({"id": "B"})).unwrap_err();
        assert!(err.is_model_operation());

        let err =
            Model::new_partial(&config(), json!({"id": "B", "immutableInt": 9})).unwrap_err();
        assert!(err.to_string().contains("is immutable"));

        let model =
            Model::new_partial(&config(), json!({"id": "B", "aNonNegInt": 3})).unwrap();
        let changes = model.lock().serialize_update().unwrap();
        assert_eq!(
            changes["aNonNegInt"],
            vellum_core::store::WriteValue::Set(json!(3))
        );
    }

    #[test]
    fn partial_model_validates_provided_values_only() {
        let err = Model::new_partial(&order(), json!({"id": "A1", "quantity": -2})).unwrap_err();
        assert!(err.is_invalid_field());

        // `product` is required but omitted; a blind update leaves it alone.
        let model = Model::new_partial(&order(), json!({"id": "A1", "quantity": 2})).unwrap();
        assert!(model.lock().serialize_update().is_ok());
    }

    #[test]
    fn unset_emits_remove_for_update() {
        let ty = order();
        let key = ty.key(json!("A1")).unwrap();
        let model = Model::from_snapshot(
            key,
            [
                ("product".to_string(), json!("tea")),
                ("quantity".to_string(), json!(1)),
                ("note".to_string(), json!("gift")),
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();

        model.unset("note").unwrap();
        let changes = model.lock().serialize_update().unwrap();
        assert_eq!(changes["note"], vellum_core::store::WriteValue::Remove);

        // Unsetting a required field is a validation error.
        assert!(model.unset("product").is_err());
    }

    #[test]
    fn diff_map_reports_changed_fields() {
        let ty = order();
        let key = ty.key(json!("A1")).unwrap();
        let model = Model::from_snapshot(
            key,
            [
                ("product".to_string(), json!("tea")),
                ("quantity".to_string(), json!(1)),
            ]
            .into_iter()
            .collect(),
        )
        .unwrap();
        model.set("quantity", json!(4)).unwrap();

        let diff = model.lock().diff_map();
        assert_eq!(diff["quantity"]["before"], json!(1));
        assert_eq!(diff["quantity"]["after"], json!(4));
        assert!(diff.get("product").is_none());
    }
}
