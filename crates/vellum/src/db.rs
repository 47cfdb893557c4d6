mod builder;
pub use builder::Builder;

use crate::context::Context;
use crate::events::Event;
use crate::model_type::ModelType;
use crate::options::ContextOptions;

use vellum_core::{store::DocumentStore, Error, Result};

use indexmap::IndexMap;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared state between all `Db` clones.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) models: IndexMap<String, Arc<ModelType>>,
}

/// A database handle: the document-store connection plus the registered
/// model types. Cheap to clone; carried explicitly (no process-wide
/// globals) and passed to every context it opens.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
}

impl Db {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub(crate) fn from_shared(shared: Shared) -> Db {
        Db {
            shared: Arc::new(shared),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.shared.store
    }

    /// Looks up a registered model type by collection name.
    pub fn model(&self, collection: &str) -> Option<&Arc<ModelType>> {
        self.shared.models.get(collection)
    }

    /// Runs `f` inside a transaction context with default options.
    pub async fn run<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_transaction(ContextOptions::default(), f).await
    }

    /// Runs `f` inside a transaction context.
    ///
    /// The closure receives a [`Context`] and is re-run from scratch on each
    /// attempt, so its side effects outside the context may occur more than
    /// once. A failed attempt retries when its error is retryable and
    /// attempts remain, sleeping an exponentially growing backoff with ±10%
    /// jitter in between; `retries + 1` attempts are made in total before
    /// the terminal failure surfaces.
    pub async fn run_transaction<T, F, Fut>(&self, options: ContextOptions, f: F) -> Result<T>
    where
        F: Fn(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        options.validate()?;

        let retries = options.retries;
        let max_backoff = options.max_backoff;
        let mut backoff = options.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(attempt, "starting transaction attempt");
            let context = Context::begin(self.clone(), options.clone()).await?;

            let result = match f(context.clone()).await {
                // Commit-time failures are classified against known store
                // error signatures; closure errors propagate unchanged.
                Ok(output) => match context.commit().await {
                    Ok(()) => Ok(output),
                    Err(err) => Err(err.classify_commit()),
                },
                Err(err) => Err(err),
            };

            match result {
                Ok(output) => {
                    context.emit(Event::PostCommit).await;
                    return Ok(output);
                }
                Err(err) => {
                    context.rollback_quietly().await;
                    if err.is_retryable() && attempt <= retries {
                        let sleep = jittered(backoff);
                        tracing::warn!(
                            attempt,
                            error = %err,
                            backoff_ms = sleep.as_millis() as u64,
                            "transaction attempt failed; retrying"
                        );
                        tokio::time::sleep(sleep).await;
                        backoff = (backoff * 2).min(max_backoff);
                        continue;
                    }

                    tracing::warn!(attempt, error = %err, "transaction failed");
                    context.emit(Event::TxFailed).await;
                    return Err(err.context(Error::transaction_failed(attempt)));
                }
            }
        }
    }
}

/// Applies ±10% jitter so synchronized retries spread out.
fn jittered(backoff: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    backoff.mul_f64(factor)
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("store", &self.shared.store)
            .field("models", &self.shared.models.keys().collect::<Vec<_>>())
            .finish()
    }
}
