//! A transactional object-document mapper for strongly-consistent document
//! stores.
//!
//! Applications declare typed document shapes ([`ModelType`]) and manipulate
//! them through a transactional [`Context`]: all-or-nothing writes,
//! jointly-consistent multi-document reads, deterministic compound-key
//! encoding, and schema validation on every assignment.
//!
//! ```no_run
//! use vellum::{ContextOptions, Db, Descriptor, ModelType};
//! use serde_json::json;
//!
//! # async fn example(store: impl vellum::store::DocumentStore) -> vellum::Result<()> {
//! let order = ModelType::builder("Order")
//!     .key("id", Descriptor::string())
//!     .field("product", Descriptor::string())
//!     .field("quantity", Descriptor::integer().min(0))
//!     .build();
//!
//! let db = Db::builder().register(&order).build(store)?;
//!
//! db.run(|ctx| {
//!     let order = order.clone();
//!     async move {
//!         let model = ctx
//!             .create(&order, json!({"id": "A1", "product": "coffee", "quantity": 1}))
//!             .await?;
//!         model.increment_by("quantity", 2)?;
//!         Ok(())
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod context;
pub use context::{Context, DeleteTarget};

pub mod db;
pub use db::Db;

mod events;
pub use events::Event;

mod field;

pub mod handle;
pub use handle::{Data, Key, UniqueKeyList};

mod model;
pub use model::{Model, ModelDiffs, SnapshotOptions};

mod model_type;
pub use model_type::{Finalize, ModelType, ModelTypeBuilder};

mod options;
pub use options::ContextOptions;

pub use vellum_core::{
    async_trait,
    key::DocumentId,
    schema::{self, Descriptor},
    store, value, Error, Result,
};
