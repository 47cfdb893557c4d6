//! An in-memory [`DocumentStore`] with optimistic transactions.
//!
//! Documents live in a process-local map, each stamped with the sequence
//! number of the write that last touched it. A transaction records the
//! version of every document it reads and buffers its writes; at commit the
//! read set is re-validated and the buffered writes apply in issue order.
//! A version mismatch fails the commit with a lock-contention error, which
//! the transaction core treats as retryable.
//!
//! Intended for tests and local development in place of a remote store. The
//! `test-hooks` feature (off by default) additionally exposes commit
//! counters and failure injection.

use vellum_core::{
    async_trait,
    store::{DocumentRef, DocumentStore, FieldMap, Snapshot, StoreSession, StoreTransaction, WriteMap, WriteValue},
    value::{add_numbers, Value},
    Error, Result,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredDoc {
    fields: FieldMap,
    version: u64,
}

#[derive(Debug, Default)]
struct Shared {
    docs: Mutex<HashMap<String, StoredDoc>>,
    /// Monotonic write sequence; doubles as the document version stamp.
    write_seq: AtomicU64,
    commit_attempts: AtomicU64,
    #[cfg(feature = "test-hooks")]
    injected_commit_failures: AtomicU64,
}

/// The in-memory document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn next_version(&self) -> u64 {
        self.shared.write_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read(&self, doc: &DocumentRef) -> (Snapshot, Option<u64>) {
        let docs = self.shared.docs.lock().unwrap();
        match docs.get(&doc.path()) {
            Some(stored) => (Snapshot::found(stored.fields.clone()), Some(stored.version)),
            None => (Snapshot::missing(), None),
        }
    }

    fn apply(
        &self,
        docs: &mut HashMap<String, StoredDoc>,
        doc: &DocumentRef,
        write: StagedWrite,
    ) -> Result<()> {
        let path = doc.path();
        match write {
            StagedWrite::Create(fields) => {
                if docs.contains_key(&path) {
                    return Err(Error::store_operation(format!(
                        "document already exists: {path}"
                    )));
                }
                docs.insert(
                    path,
                    StoredDoc {
                        fields,
                        version: self.next_version(),
                    },
                );
            }
            StagedWrite::Set(fields) => {
                docs.insert(
                    path,
                    StoredDoc {
                        fields,
                        version: self.next_version(),
                    },
                );
            }
            StagedWrite::Update(changes) => {
                let Some(stored) = docs.get_mut(&path) else {
                    return Err(Error::store_operation(format!(
                        "no document to update: {path}"
                    )));
                };
                for (name, change) in changes {
                    match change {
                        WriteValue::Set(value) => {
                            stored.fields.insert(name, value);
                        }
                        WriteValue::Remove => {
                            stored.fields.shift_remove(&name);
                        }
                        WriteValue::Increment(delta) => {
                            let next = match stored.fields.get(&name).and_then(Value::as_number) {
                                Some(current) => add_numbers(current, &delta)?,
                                // Incrementing an absent field seeds it with the delta.
                                None => delta,
                            };
                            stored.fields.insert(name, Value::Number(next));
                        }
                    }
                }
                stored.version = self.next_version();
            }
            StagedWrite::Delete { require_exists } => {
                let removed = docs.remove(&path).is_some();
                if require_exists && !removed {
                    return Err(Error::store_operation(format!(
                        "no document to delete: {path}"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "test-hooks")]
impl MemoryStore {
    /// Number of transaction commits attempted so far.
    pub fn commit_attempts(&self) -> u64 {
        self.shared.commit_attempts.load(Ordering::Relaxed)
    }

    /// Number of document writes applied so far.
    pub fn write_seq(&self) -> u64 {
        self.shared.write_seq.load(Ordering::Relaxed)
    }

    /// Makes the next `n` transaction commits fail with a retryable
    /// lock-contention error.
    pub fn fail_next_commits(&self, n: u64) {
        self.shared
            .injected_commit_failures
            .store(n, Ordering::Relaxed);
    }

    /// Reads a document's raw stored fields, bypassing any transaction.
    pub fn peek(&self, doc: &DocumentRef) -> Option<FieldMap> {
        let docs = self.shared.docs.lock().unwrap();
        docs.get(&doc.path()).map(|stored| stored.fields.clone())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn session(&self) -> Result<Box<dyn StoreSession>> {
        Ok(Box::new(DirectSession {
            store: self.clone(),
        }))
    }

    async fn begin(&self, read_only: bool) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            read_only,
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum StagedWrite {
    Create(FieldMap),
    Set(FieldMap),
    Update(WriteMap),
    Delete { require_exists: bool },
}

/// Direct access: every operation applies immediately.
#[derive(Debug)]
struct DirectSession {
    store: MemoryStore,
}

#[async_trait]
impl StoreSession for DirectSession {
    async fn get(&mut self, doc: &DocumentRef) -> Result<Snapshot> {
        Ok(self.store.read(doc).0)
    }

    async fn get_all(&mut self, docs: &[DocumentRef]) -> Result<Vec<Snapshot>> {
        Ok(docs.iter().map(|doc| self.store.read(doc).0).collect())
    }

    async fn create(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()> {
        let mut docs = self.store.shared.docs.lock().unwrap();
        self.store.apply(&mut docs, doc, StagedWrite::Create(data))
    }

    async fn set(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()> {
        let mut docs = self.store.shared.docs.lock().unwrap();
        self.store.apply(&mut docs, doc, StagedWrite::Set(data))
    }

    async fn update(&mut self, doc: &DocumentRef, data: WriteMap) -> Result<()> {
        let mut docs = self.store.shared.docs.lock().unwrap();
        self.store.apply(&mut docs, doc, StagedWrite::Update(data))
    }

    async fn delete(&mut self, doc: &DocumentRef, require_exists: bool) -> Result<()> {
        let mut docs = self.store.shared.docs.lock().unwrap();
        self.store
            .apply(&mut docs, doc, StagedWrite::Delete { require_exists })
    }
}

/// Optimistic transaction: validated read set, buffered writes.
#[derive(Debug)]
struct MemoryTransaction {
    store: MemoryStore,
    read_only: bool,
    /// Document path -> version observed at read time (`None` = absent).
    reads: HashMap<String, Option<u64>>,
    writes: Vec<(DocumentRef, StagedWrite)>,
}

impl MemoryTransaction {
    fn stage(&mut self, doc: &DocumentRef, write: StagedWrite) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only_write(format!("{write:?} on {doc}")));
        }
        self.writes.push((doc.clone(), write));
        Ok(())
    }
}

#[async_trait]
impl StoreSession for MemoryTransaction {
    async fn get(&mut self, doc: &DocumentRef) -> Result<Snapshot> {
        let (snapshot, version) = self.store.read(doc);
        self.reads.entry(doc.path()).or_insert(version);
        Ok(snapshot)
    }

    async fn get_all(&mut self, docs: &[DocumentRef]) -> Result<Vec<Snapshot>> {
        // One lock acquisition for the whole batch keeps it a snapshot.
        let stored = self.store.shared.docs.lock().unwrap();
        let mut snapshots = Vec::with_capacity(docs.len());
        for doc in docs {
            match stored.get(&doc.path()) {
                Some(found) => {
                    self.reads
                        .entry(doc.path())
                        .or_insert(Some(found.version));
                    snapshots.push(Snapshot::found(found.fields.clone()));
                }
                None => {
                    self.reads.entry(doc.path()).or_insert(None);
                    snapshots.push(Snapshot::missing());
                }
            }
        }
        Ok(snapshots)
    }

    async fn create(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()> {
        self.stage(doc, StagedWrite::Create(data))
    }

    async fn set(&mut self, doc: &DocumentRef, data: FieldMap) -> Result<()> {
        self.stage(doc, StagedWrite::Set(data))
    }

    async fn update(&mut self, doc: &DocumentRef, data: WriteMap) -> Result<()> {
        self.stage(doc, StagedWrite::Update(data))
    }

    async fn delete(&mut self, doc: &DocumentRef, require_exists: bool) -> Result<()> {
        self.stage(doc, StagedWrite::Delete { require_exists })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let store = self.store.clone();
        store.shared.commit_attempts.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "test-hooks")]
        {
            let remaining = &store.shared.injected_commit_failures;
            if remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_ok()
            {
                tracing::debug!("failing commit via injected contention");
                return Err(Error::store_operation(
                    "transaction lock contention: injected failure",
                ));
            }
        }

        let mut docs = store.shared.docs.lock().unwrap();

        for (path, seen) in &self.reads {
            let current = docs.get(path).map(|stored| stored.version);
            if current != *seen {
                tracing::debug!(path = %path, "optimistic check failed");
                return Err(Error::store_operation(format!(
                    "transaction lock contention: concurrent modification of {path}"
                )));
            }
        }

        for (doc, write) in self.writes {
            store.apply(&mut docs, &doc, write)?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
