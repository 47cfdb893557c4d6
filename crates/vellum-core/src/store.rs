//! The document-store contract the transaction core drives.
//!
//! A driver implements [`DocumentStore`], handing out either a direct
//! [`StoreSession`] (each read individually consistent) or a
//! [`StoreTransaction`] (reads share one snapshot, writes apply atomically at
//! commit). The core depends only on these traits; concrete drivers live in
//! their own crates.

use crate::{key::DocumentId, value::Number, value::Value, Result};

use indexmap::IndexMap;
use std::fmt;

/// Addresses one document: `collection/encoded-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: DocumentId) -> DocumentRef {
        DocumentRef {
            collection: collection.into(),
            id,
        }
    }

    /// The canonical document path used for tracking and diagnostics.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Plain field values, as stored on the wire.
pub type FieldMap = IndexMap<String, Value>;

/// Field-level write expressions for updates.
pub type WriteMap = IndexMap<String, WriteValue>;

/// The write expression for one field of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// Store this value.
    Set(Value),
    /// Field-deletion sentinel: remove the field from the document.
    Remove,
    /// Atomic-increment sentinel: add to the stored numeric server-side.
    Increment(Number),
}

/// The result of reading one document.
#[derive(Debug, Clone)]
pub struct Snapshot {
    fields: Option<FieldMap>,
}

impl Snapshot {
    /// A snapshot of an existing document with the given fields.
    pub fn found(fields: FieldMap) -> Snapshot {
        Snapshot {
            fields: Some(fields),
        }
    }

    /// A snapshot recording that the document does not exist.
    pub fn missing() -> Snapshot {
        Snapshot { fields: None }
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    /// The document's fields, if it exists.
    pub fn data(self) -> Option<FieldMap> {
        self.fields
    }
}

/// A handle to a document store. Thread-safe by contract; shared
/// process-wide behind an `Arc`.
#[crate::async_trait]
pub trait DocumentStore: fmt::Debug + Send + Sync + 'static {
    /// Opens a direct-access session: operations apply immediately and reads
    /// are individually (not jointly) consistent.
    async fn session(&self) -> Result<Box<dyn StoreSession>>;

    /// Begins a transaction. Reads observe one snapshot; writes are buffered
    /// and applied atomically, in issue order, at commit.
    async fn begin(&self, read_only: bool) -> Result<Box<dyn StoreTransaction>>;
}

/// The uniform operation surface shared by direct sessions and transactions.
#[crate::async_trait]
pub trait StoreSession: Send {
    /// Point read.
    async fn get(&mut self, doc: &DocumentRef) -> Result<Snapshot>;

    /// Batched read; inside a transaction the batch is a consistent snapshot.
    /// Results are positionally aligned with `docs`.
    async fn get_all(&mut self, docs: &[DocumentRef]) -> Result<Vec<Snapshot>>;

    /// Create-only write; fails if the document already exists.
    async fn create(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()>;

    /// Overwriting set: replaces the document, creating it if missing.
    async fn set(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()>;

    /// Field-level update; fails if the document does not exist.
    async fn update(&mut self, doc: &DocumentRef, data: WriteMap) -> Result<()>;

    /// Delete. With `require_exists`, fails if the document is missing.
    async fn delete(&mut self, doc: &DocumentRef, require_exists: bool) -> Result<()>;
}

/// A transaction: a [`StoreSession`] that must be committed for its writes
/// to take effect.
#[crate::async_trait]
pub trait StoreTransaction: StoreSession {
    /// Commits buffered writes. Consumes the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Abandons the transaction and its buffered writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
