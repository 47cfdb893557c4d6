use crate::db::Db;
use crate::events::{Event, EventHandlers};
use crate::handle::{Data, Key};
use crate::model::{Model, ModelDiffs, SnapshotOptions};
use crate::model_type::ModelType;
use crate::options::ContextOptions;

use vellum_core::{
    store::{DocumentRef, FieldMap, Snapshot, StoreSession, StoreTransaction, WriteMap},
    value::Value,
    Error, Result,
};

use indexmap::IndexMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// A scoped unit of document work, optionally wrapped in a store
/// transaction.
///
/// Handed to the closure passed to [`Db::run_transaction`]. All reads and
/// writes go through the context, which tracks every touched document and
/// dispatches the final write shape for each at commit. Cloning the handle
/// is cheap; clones share the same tracked state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    db: Db,
    session: tokio::sync::Mutex<Session>,
    state: Mutex<State>,
}

enum Session {
    Transaction(Box<dyn StoreTransaction>),
    Direct(Box<dyn StoreSession>),
    Finished,
}

struct State {
    options: ContextOptions,
    tracked: IndexMap<String, Slot>,
    handlers: EventHandlers,
}

/// The context-local disposition of one document.
#[derive(Clone)]
enum Slot {
    /// A live model instance.
    Live(Model),
    /// Fetched from the store and found absent.
    Absent,
    /// Deleted by this context.
    Deleted,
}

impl Slot {
    fn into_model(self) -> Option<Model> {
        match self {
            Slot::Live(model) => Some(model),
            Slot::Absent | Slot::Deleted => None,
        }
    }
}

/// A `delete` target: a key, or a model already tracked by the context.
pub enum DeleteTarget {
    Key(Key),
    Model(Model),
}

impl From<Key> for DeleteTarget {
    fn from(key: Key) -> DeleteTarget {
        DeleteTarget::Key(key)
    }
}

impl From<&Key> for DeleteTarget {
    fn from(key: &Key) -> DeleteTarget {
        DeleteTarget::Key(key.clone())
    }
}

impl From<Model> for DeleteTarget {
    fn from(model: Model) -> DeleteTarget {
        DeleteTarget::Model(model)
    }
}

impl From<&Model> for DeleteTarget {
    fn from(model: &Model) -> DeleteTarget {
        DeleteTarget::Model(model.clone())
    }
}

impl Context {
    pub(crate) async fn begin(db: Db, options: ContextOptions) -> Result<Context> {
        // A transaction is skipped only for read-only contexts that opted
        // out of jointly-consistent reads.
        let session = if options.read_only && !options.consistent_reads {
            Session::Direct(db.store().session().await?)
        } else {
            Session::Transaction(db.store().begin(options.read_only).await?)
        };
        tracing::debug!(
            read_only = options.read_only,
            transactional = matches!(session, Session::Transaction(_)),
            "context started"
        );

        Ok(Context {
            inner: Arc::new(ContextInner {
                db,
                session: tokio::sync::Mutex::new(session),
                state: Mutex::new(State {
                    options,
                    tracked: IndexMap::new(),
                    handlers: EventHandlers::default(),
                }),
            }),
        })
    }

    /// The database handle this context operates on.
    pub fn db(&self) -> &Db {
        &self.inner.db
    }

    // ---- reads -----------------------------------------------------------

    /// Reads one document. Returns `None` if it does not exist (the absence
    /// is tracked, so a later `create` of the same key in this context still
    /// collides).
    pub async fn get(&self, key: &Key) -> Result<Option<Model>> {
        if let Some(slot) = self.cached_or_reject(&key.path())? {
            return Ok(slot.into_model());
        }
        let snapshot = self.session_get(&key.doc_ref()).await?;
        let slot = self.materialize(key.clone(), snapshot, None)?;
        Ok(slot.into_model())
    }

    /// Reads a batch of documents in one store round trip. Inside a
    /// transaction the batch is a consistent snapshot. Results align with
    /// `keys`.
    pub async fn get_all(&self, keys: &[Key]) -> Result<Vec<Option<Model>>> {
        let slots = self.fetch_all(keys, None).await?;
        Ok(slots.into_iter().map(Slot::into_model).collect())
    }

    /// Reads one document, materializing it from `data` with
    /// `is_new == true` if it does not exist.
    pub async fn get_or_create(&self, data: Data) -> Result<Model> {
        if let Some(slot) = self.cached_or_reject(&data.key().path())? {
            return slot.into_model().ok_or_else(|| {
                Error::model_operation(format!("{} was deleted in this context", data.key()))
            });
        }
        let snapshot = self.session_get(&data.key().doc_ref()).await?;
        let key = data.key().clone();
        let slot = self.materialize(key, snapshot, Some(data))?;
        // A fallback is always materialized into a live model.
        Ok(slot.into_model().unwrap())
    }

    /// Batched [`get_or_create`](Self::get_or_create).
    pub async fn get_all_or_create(&self, data: Vec<Data>) -> Result<Vec<Model>> {
        let keys: Vec<Key> = data.iter().map(|d| d.key().clone()).collect();
        let slots = self.fetch_all(&keys, Some(data)).await?;
        slots
            .into_iter()
            .zip(keys)
            .map(|(slot, key)| {
                slot.into_model().ok_or_else(|| {
                    Error::model_operation(format!("{key} was deleted in this context"))
                })
            })
            .collect()
    }

    async fn fetch_all(&self, keys: &[Key], data: Option<Vec<Data>>) -> Result<Vec<Slot>> {
        let mut fallbacks: Vec<Option<Data>> = match data {
            Some(list) => list.into_iter().map(Some).collect(),
            None => Vec::new(),
        };
        let mut slots: Vec<Option<Slot>> = Vec::with_capacity(keys.len());
        let mut misses: Vec<usize> = Vec::new();

        for key in keys {
            match self.cached_or_reject(&key.path())? {
                Some(slot) => slots.push(Some(slot)),
                None => {
                    misses.push(slots.len());
                    slots.push(None);
                }
            }
        }

        if !misses.is_empty() {
            let refs: Vec<DocumentRef> =
                misses.iter().map(|&i| keys[i].doc_ref()).collect();
            let snapshots = {
                let mut session = self.inner.session.lock().await;
                session_mut(&mut session)?.get_all(&refs).await?
            };
            if snapshots.len() != refs.len() {
                return Err(Error::store_operation(format!(
                    "batched read returned {} snapshots for {} refs",
                    snapshots.len(),
                    refs.len()
                )));
            }
            for (&i, snapshot) in misses.iter().zip(snapshots) {
                let fallback = fallbacks.get_mut(i).and_then(Option::take);
                // Tracking is re-checked per slot: the same key appearing
                // twice in one batch follows the cache policy too.
                let slot = match self.cached_or_reject(&keys[i].path())? {
                    Some(slot) => slot,
                    None => self.materialize(keys[i].clone(), snapshot, fallback)?,
                };
                slots[i] = Some(slot);
            }
        }

        Ok(slots.into_iter().map(Option::unwrap).collect())
    }

    async fn session_get(&self, doc: &DocumentRef) -> Result<Snapshot> {
        let mut session = self.inner.session.lock().await;
        session_mut(&mut session)?.get(doc).await
    }

    /// Returns the cached slot when the path is already tracked and the
    /// model cache permits it; rejects with `ModelTrackedTwice` otherwise.
    fn cached_or_reject(&self, path: &str) -> Result<Option<Slot>> {
        let state = self.state();
        match state.tracked.get(path) {
            None => Ok(None),
            Some(slot) if state.options.cache_models => Ok(Some(slot.clone())),
            Some(_) => Err(Error::model_tracked_twice(path)),
        }
    }

    /// Turns a snapshot into a tracked slot.
    fn materialize(&self, key: Key, snapshot: Snapshot, fallback: Option<Data>) -> Result<Slot> {
        let path = key.path();
        let slot = if snapshot.exists() {
            Slot::Live(Model::from_snapshot(key, snapshot.data().unwrap())?)
        } else if let Some(data) = fallback {
            Slot::Live(Model::from_data_missing(data)?)
        } else {
            Slot::Absent
        };
        self.track(path, slot.clone())?;
        Ok(slot)
    }

    fn track(&self, path: String, slot: Slot) -> Result<()> {
        let mut state = self.state();
        if state.tracked.contains_key(&path) && !state.options.cache_models {
            return Err(Error::model_tracked_twice(path));
        }
        state.tracked.insert(path, slot);
        Ok(())
    }

    // ---- writes ----------------------------------------------------------

    /// Declares a new document. Purely local until commit, where it becomes
    /// a create-only write that fails if the document exists.
    pub async fn create(
        &self,
        ty: &Arc<ModelType>,
        values: impl Into<Value>,
    ) -> Result<Model> {
        self.create_model(ty, values.into(), false)
    }

    /// Like [`create`](Self::create), but the commit-time write replaces any
    /// existing document.
    pub async fn create_or_overwrite(
        &self,
        ty: &Arc<ModelType>,
        values: impl Into<Value>,
    ) -> Result<Model> {
        self.create_model(ty, values.into(), true)
    }

    fn create_model(&self, ty: &Arc<ModelType>, values: Value, overwrite: bool) -> Result<Model> {
        self.ensure_writable("create")?;
        let model = Model::new_created(ty, values, overwrite)?;
        let path = model.key().path();
        self.track(path, Slot::Live(model.clone()))?;
        Ok(model)
    }

    /// Blind field-level update: no read, no defaults, only the provided
    /// attributes change. The write is dispatched immediately (buffered by
    /// the transaction until commit) and fails if the document is missing.
    pub async fn update_without_read(
        &self,
        ty: &Arc<ModelType>,
        values: impl Into<Value>,
    ) -> Result<Model> {
        self.ensure_writable("update_without_read")?;
        let model = Model::new_partial(ty, values.into())?;
        let path = model.key().path();
        self.track(path, Slot::Live(model.clone()))?;

        self.run_finalize(&model).await?;

        let (doc, changes) = {
            let state = model.lock();
            state.validate_for_write()?;
            (state.doc_ref(), state.serialize_update()?)
        };
        self.session_update(&doc, changes).await?;
        model.lock().mark_flushed();
        Ok(model)
    }

    /// Deletes one document by key or tracked model. The deletion is
    /// tracked eagerly; deleting the same key twice in one context raises.
    pub async fn delete(&self, target: impl Into<DeleteTarget>) -> Result<()> {
        self.ensure_writable("delete")?;
        let (key, was_read) = match target.into() {
            DeleteTarget::Key(key) => (key, false),
            DeleteTarget::Model(model) => (model.key(), !model.is_new()),
        };
        let path = key.path();

        let require_exists = {
            let mut state = self.state();
            let require_exists = match state.tracked.get(&path) {
                Some(Slot::Deleted) => return Err(Error::deleted_twice(path)),
                Some(Slot::Live(model)) => !model.is_new(),
                Some(Slot::Absent) => false,
                None => was_read,
            };
            state.tracked.insert(path, Slot::Deleted);
            require_exists
        };

        let mut session = self.inner.session.lock().await;
        session_mut(&mut session)?
            .delete(&key.doc_ref(), require_exists)
            .await
    }

    /// Deletes several documents.
    pub async fn delete_all(
        &self,
        targets: impl IntoIterator<Item = DeleteTarget>,
    ) -> Result<()> {
        for target in targets {
            self.delete(target).await?;
        }
        Ok(())
    }

    async fn session_update(&self, doc: &DocumentRef, changes: WriteMap) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        session_mut(&mut session)?.update(doc, changes).await
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.state().options.read_only {
            return Err(Error::read_only_write(operation));
        }
        Ok(())
    }

    // ---- option toggles and events --------------------------------------

    /// Rejects writes from here on.
    pub fn make_read_only(&self) {
        self.state().options.read_only = true;
    }

    /// From here on, a repeated `get` of a tracked key returns the cached
    /// instance instead of raising.
    pub fn enable_model_cache(&self) {
        self.state().options.cache_models = true;
    }

    /// Registers a single-fire handler for a lifecycle event. Handlers run
    /// in registration order, awaited sequentially, after the event occurs.
    pub fn add_event_handler<F, Fut>(&self, event: Event, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.state().handlers.add(event, None, handler);
    }

    /// Like [`add_event_handler`](Self::add_event_handler), with a name for
    /// diagnostics.
    pub fn add_named_event_handler<F, Fut>(&self, event: Event, name: &str, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.state()
            .handlers
            .add(event, Some(name.to_string()), handler);
    }

    // ---- snapshots -------------------------------------------------------

    /// Before/after/diff snapshots for every live tracked model, in tracking
    /// order. Deleted and fetched-absent slots are omitted.
    pub fn get_model_diffs(&self) -> ModelDiffs {
        self.get_model_diffs_where(|_| true)
    }

    /// [`get_model_diffs`](Self::get_model_diffs) restricted to models the
    /// filter accepts.
    pub fn get_model_diffs_where(&self, filter: impl Fn(&Model) -> bool) -> ModelDiffs {
        let state = self.state();
        let mut diffs = ModelDiffs::default();
        for slot in state.tracked.values() {
            let Slot::Live(model) = slot else { continue };
            if !filter(model) {
                continue;
            }
            let model_state = model.lock();
            diffs.before.push(model_state.snapshot_map(SnapshotOptions {
                initial: true,
                ..Default::default()
            }));
            diffs.after.push(model_state.snapshot_map(SnapshotOptions::default()));
            diffs.diff.push(model_state.diff_map());
        }
        diffs
    }

    // ---- commit ----------------------------------------------------------

    /// Walks the tracked slots in insertion order, dispatches each pending
    /// write, and commits the store transaction.
    pub(crate) async fn commit(&self) -> Result<()> {
        let (slots, read_only) = {
            let state = self.state();
            (
                state
                    .tracked
                    .iter()
                    .map(|(path, slot)| (path.clone(), slot.clone()))
                    .collect::<Vec<_>>(),
                state.options.read_only,
            )
        };

        for (path, slot) in slots {
            let Slot::Live(model) = slot else {
                // Deletes were dispatched eagerly; absences carry no write.
                continue;
            };

            let needs_write = {
                let state = model.lock();
                state.is_new() || state.has_changes(!read_only)
            };
            if !needs_write {
                continue;
            }
            if read_only {
                return Err(Error::read_only_write(format!("commit of {path}")));
            }

            self.run_finalize(&model).await?;

            enum Pending {
                Create(FieldMap),
                Set(FieldMap),
                Update(WriteMap),
            }
            let (doc, pending) = {
                let state = model.lock();
                state.validate_for_write()?;
                let pending = if state.is_new() && state.is_set() {
                    Pending::Set(state.serialize_full())
                } else if state.is_new() {
                    Pending::Create(state.serialize_full())
                } else {
                    Pending::Update(state.serialize_update()?)
                };
                (state.doc_ref(), pending)
            };

            tracing::debug!(path = %path, "dispatching write");
            let mut session = self.inner.session.lock().await;
            let session = session_mut(&mut session)?;
            match pending {
                Pending::Create(data) => session.create(&doc, data).await?,
                Pending::Set(data) => session.set(&doc, data).await?,
                Pending::Update(changes) => session.update(&doc, changes).await?,
            }
        }

        let mut session = self.inner.session.lock().await;
        match std::mem::replace(&mut *session, Session::Finished) {
            Session::Transaction(tx) => tx.commit().await,
            Session::Direct(_) => Ok(()),
            Session::Finished => Err(Error::msg("context already finished")),
        }
    }

    pub(crate) async fn rollback_quietly(&self) {
        let mut session = self.inner.session.lock().await;
        if let Session::Transaction(tx) = std::mem::replace(&mut *session, Session::Finished) {
            if let Err(err) = tx.rollback().await {
                tracing::warn!(error = %err, "rollback failed");
            }
        }
    }

    /// Fires the single-shot handlers registered for `event`, in order.
    pub(crate) async fn emit(&self, event: Event) {
        let fired = self.state().handlers.take(event);
        for (name, handler) in fired {
            tracing::debug!(
                event = event.as_str(),
                handler = name.as_deref().unwrap_or("<unnamed>"),
                "firing event handler"
            );
            handler().await;
        }
    }

    async fn run_finalize(&self, model: &Model) -> Result<()> {
        let ty = model.model_type();
        if let Some(hook) = ty.finalize_hook() {
            hook.finalize(model.clone()).await?;
        }
        Ok(())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap()
    }
}

fn session_mut(session: &mut Session) -> Result<&mut dyn StoreSession> {
    match session {
        Session::Transaction(tx) => Ok(tx.as_mut()),
        Session::Direct(direct) => Ok(direct.as_mut()),
        Session::Finished => Err(Error::msg("context already finished")),
    }
}
