use crate::handle::{Data, Key};
use crate::model::Model;

use vellum_core::{
    async_trait,
    schema::{CompiledSchema, Descriptor, ModelSchema},
    value::Value,
    Result,
};

use std::sync::Arc;

/// A hook run just before each write of a model, after the application's
/// closure has finished with it. Typically stamps derived fields such as
/// timestamps or versions; its mutations are schema-validated like any
/// other write.
#[async_trait]
pub trait Finalize: Send + Sync + 'static {
    async fn finalize(&self, model: Model) -> Result<()>;
}

/// A model's static declaration: its schema plus the optional finalize hook.
///
/// Declared once at startup and shared behind an `Arc`; the schema compiles
/// lazily on first use.
pub struct ModelType {
    schema: ModelSchema,
    finalize: Option<Box<dyn Finalize>>,
}

impl ModelType {
    pub fn builder(collection: impl Into<String>) -> ModelTypeBuilder {
        ModelTypeBuilder {
            schema: ModelSchema::builder(collection),
            finalize: None,
        }
    }

    /// The collection this model's documents live in.
    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub(crate) fn compiled(&self) -> Result<Arc<CompiledSchema>> {
        self.schema.compiled()
    }

    pub(crate) fn finalize_hook(&self) -> Option<&dyn Finalize> {
        self.finalize.as_deref()
    }

    /// Builds a [`Key`] addressing a document of this model.
    ///
    /// Accepts a component map, or a bare scalar as shorthand when the key
    /// has exactly one component.
    pub fn key(self: &Arc<Self>, input: impl Into<Value>) -> Result<Key> {
        Key::of(self, input.into())
    }

    /// Builds a [`Data`] handle: a key plus initial values for the non-key
    /// fields, used by `get_or_create` to materialize missing documents.
    pub fn data(self: &Arc<Self>, values: impl Into<Value>) -> Result<Data> {
        Data::of(self, values.into())
    }
}

impl std::fmt::Debug for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelType")
            .field("collection", &self.collection())
            .field("has_finalize", &self.finalize.is_some())
            .finish()
    }
}

/// Builder for a [`ModelType`].
pub struct ModelTypeBuilder {
    schema: vellum_core::schema::ModelSchemaBuilder,
    finalize: Option<Box<dyn Finalize>>,
}

impl ModelTypeBuilder {
    /// Declares a key component.
    pub fn key(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.schema = self.schema.key(name, descriptor);
        self
    }

    /// Declares a non-key data field.
    pub fn field(mut self, name: impl Into<String>, descriptor: Descriptor) -> Self {
        self.schema = self.schema.field(name, descriptor);
        self
    }

    /// Installs the pre-write hook.
    pub fn finalize(mut self, hook: impl Finalize) -> Self {
        self.finalize = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Arc<ModelType> {
        Arc::new(ModelType {
            schema: self.schema.build(),
            finalize: self.finalize,
        })
    }
}
