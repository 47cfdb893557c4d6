//! Declarative document shapes and their compiled runtime form.
//!
//! A model declares its key components and data fields as [`Descriptor`]s.
//! The first use of a model compiles those declarations into a
//! [`CompiledSchema`]: per-attribute [`FieldOptions`] plus the sorted key
//! order the identifier codec depends on.

mod descriptor;
pub use descriptor::Descriptor;

mod field_options;
pub use field_options::FieldOptions;

mod model;
pub use model::{CompiledSchema, ModelSchema, ModelSchemaBuilder};
