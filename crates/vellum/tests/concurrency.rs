mod support;

use support::{db_with, order_type};

use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vellum::{store::DocumentRef, ContextOptions, Descriptor, DocumentId, Event, ModelType};
use vellum_driver_memory::MemoryStore;

fn counter_type() -> Arc<ModelType> {
    ModelType::builder("Counter")
        .key("id", Descriptor::string())
        .field("count", Descriptor::integer())
        .build()
}

fn fast_retries(retries: u32) -> ContextOptions {
    ContextOptions::default()
        .retries(retries)
        .initial_backoff(Duration::from_millis(1))
        .max_backoff(Duration::from_millis(200))
}

#[tokio::test]
async fn concurrent_unread_increments_both_land() {
    let store = MemoryStore::new();
    let counter = counter_type();
    let db = db_with(&store, &[&counter]);

    db.run(|ctx| {
        let counter = counter.clone();
        async move {
            ctx.create(&counter, json!({"id": "C", "count": 0})).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    // Two concurrent contexts increment the field without ever reading it;
    // the increment sentinel (plus retries on contention) guarantees both
    // deltas land.
    let increment = |db: vellum::Db, counter: Arc<ModelType>| async move {
        db.run_transaction(fast_retries(4), |ctx| {
            let counter = counter.clone();
            async move {
                let model = ctx.get(&counter.key(json!("C"))?).await?.unwrap();
                model.increment_by("count", 1)?;
                Ok(())
            }
        })
        .await
    };

    let (a, b) = tokio::join!(
        increment(db.clone(), counter.clone()),
        increment(db.clone(), counter.clone())
    );
    a.unwrap();
    b.unwrap();

    let fields = store
        .peek(&DocumentRef::new("Counter", DocumentId::from("C")))
        .unwrap();
    assert_eq!(fields["count"], json!(2));
}

#[tokio::test]
async fn contention_retries_until_success() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    store.fail_next_commits(2);
    let commits_before = store.commit_attempts();

    let post_commits = Arc::new(AtomicU32::new(0));
    let observed = post_commits.clone();

    db.run_transaction(fast_retries(4), |ctx| {
        let order = order.clone();
        let post_commits = post_commits.clone();
        async move {
            ctx.add_event_handler(Event::PostCommit, move || async move {
                post_commits.fetch_add(1, Ordering::SeqCst);
            });
            ctx.create(
                &order,
                json!({"id": "A1", "product": "coffee", "quantity": 1}),
            )
            .await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    // Two injected failures, then success: three attempts in total.
    assert_eq!(store.commit_attempts() - commits_before, 3);
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(store
        .peek(&DocumentRef::new("Order", DocumentId::from("A1")))
        .is_some());
}

#[tokio::test]
async fn exhausted_retries_make_exactly_retries_plus_one_attempts() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    store.fail_next_commits(10);
    let commits_before = store.commit_attempts();

    let failures = Arc::new(AtomicU32::new(0));
    let observed = failures.clone();

    let err = db
        .run_transaction(fast_retries(2), |ctx| {
            let order = order.clone();
            let failures = failures.clone();
            async move {
                ctx.add_event_handler(Event::TxFailed, move || async move {
                    failures.fetch_add(1, Ordering::SeqCst);
                });
                ctx.create(
                    &order,
                    json!({"id": "A1", "product": "coffee", "quantity": 1}),
                )
                .await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_transaction_failed());
    assert!(err.is_retryable());
    assert_eq!(store.commit_attempts() - commits_before, 3);
    // TX_FAILED fires once, on the final attempt.
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(store
        .peek(&DocumentRef::new("Order", DocumentId::from("A1")))
        .is_none());
}

#[tokio::test]
async fn application_errors_propagate_without_retry() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    let runs = Arc::new(AtomicU32::new(0));
    let observed = runs.clone();

    let err = db
        .run_transaction(fast_retries(4), |_ctx| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(vellum::Error::msg("nope"))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_transaction_failed());
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn marked_retryable_application_errors_retry() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    let runs = Arc::new(AtomicU32::new(0));
    let observed = runs.clone();

    db.run_transaction(fast_retries(4), |_ctx| {
        let runs = runs.clone();
        async move {
            if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(vellum::Error::msg("transient").mark_retryable());
            }
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn conflicting_read_write_transactions_converge() {
    let store = MemoryStore::new();
    let counter = counter_type();
    let db = db_with(&store, &[&counter]);

    db.run(|ctx| {
        let counter = counter.clone();
        async move {
            ctx.create(&counter, json!({"id": "C", "count": 0})).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    // Classic read-modify-write race: both read 0, so without retries one
    // increment would be lost. The losing commit fails its optimistic check
    // and re-runs against the fresh value.
    let bump = |db: vellum::Db, counter: Arc<ModelType>| async move {
        db.run_transaction(fast_retries(6), |ctx| {
            let counter = counter.clone();
            async move {
                let model = ctx.get(&counter.key(json!("C"))?).await?.unwrap();
                let current = model.get("count")?.unwrap().as_i64().unwrap();
                model.set("count", json!(current + 1))?;
                Ok(())
            }
        })
        .await
    };

    let (a, b) = tokio::join!(
        bump(db.clone(), counter.clone()),
        bump(db.clone(), counter.clone())
    );
    a.unwrap();
    b.unwrap();

    let fields = store
        .peek(&DocumentRef::new("Counter", DocumentId::from("C")))
        .unwrap();
    assert_eq!(fields["count"], json!(2));
}
