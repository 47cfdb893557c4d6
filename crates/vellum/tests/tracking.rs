mod support;

use support::{db_with, order_type};

use serde_json::json;
use std::sync::Arc;
use vellum::{
    async_trait, store::DocumentRef, ContextOptions, Descriptor, DocumentId, Finalize, Model,
    ModelType, Result,
};
use vellum_driver_memory::MemoryStore;

#[tokio::test]
async fn repeated_get_requires_the_model_cache() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    db.run(|ctx| {
        let order = order.clone();
        async move {
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

    // Without the cache the second get raises.
    let order2 = order.clone();
    let err = db
        .run(|ctx| {
            let order = order2.clone();
            async move {
                ctx.get(&order.key(json!("A1"))?).await?;
                ctx.get(&order.key(json!("A1"))?).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();
    assert!(err.root_cause().is_model_tracked_twice());

    // With it, both gets return the same tracked instance.
    let order3 = order.clone();
    db.run_transaction(ContextOptions::default().cache_models(true), |ctx| {
        let order = order3.clone();
        async move {
            let first = ctx.get(&order.key(json!("A1"))?).await?.unwrap();
            let second = ctx.get(&order.key(json!("A1"))?).await?.unwrap();
            assert!(first.same_instance(&second));
            Ok(())
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn cached_absence_is_returned_without_rereading() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    db.run_transaction(ContextOptions::default().cache_models(true), |ctx| {
        let order = order.clone();
        async move {
            assert!(ctx.get(&order.key(json!("nope"))?).await?.is_none());
            // The second get is served from the tracked absence.
            assert!(ctx.get(&order.key(json!("nope"))?).await?.is_none());
            Ok(())
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn read_only_contexts_reject_writes_before_the_store() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);
    let writes_before = store.write_seq();

    for consistent in [true, false] {
        let options = ContextOptions::default()
            .read_only(true)
            .consistent_reads(consistent)
            .retries(0);
        let order2 = order.clone();
        let err = db
            .run_transaction(options, |ctx| {
                let order = order2.clone();
                async move {
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
        assert!(err.root_cause().is_read_only_write());
    }
    assert_eq!(store.write_seq(), writes_before);
}

#[tokio::test]
async fn mutating_a_fetched_model_in_a_read_only_context_fails_at_commit() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    db.run(|ctx| {
        let order = order.clone();
        async move {
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

    let order2 = order.clone();
    let err = db
        .run_transaction(
            ContextOptions::default().read_only(true).retries(0),
            |ctx| {
                let order = order2.clone();
                async move {
                    let model = ctx.get(&order.key(json!("A1"))?).await?.unwrap();
                    model.set("quantity", json!(9))?;
                    Ok(())
                }
            },
        )
        .await
        .unwrap_err();
    assert!(err.root_cause().is_read_only_write());
}

#[tokio::test]
async fn make_read_only_applies_to_subsequent_operations() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    let err = db
        .run(|ctx| {
            let order = order.clone();
            async move {
                ctx.create(
                    &order,
                    json!({"id": "A1", "product": "coffee", "quantity": 1}),
                )
                .await?;
                ctx.make_read_only();
                ctx.create(
                    &order,
                    json!({"id": "A2", "product": "tea", "quantity": 1}),
                )
                .await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();
    assert!(err.root_cause().is_read_only_write());
}

#[tokio::test]
async fn untouched_context_writes_nothing() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    db.run(|ctx| {
        let order = order.clone();
        async move {
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
    let writes_before = store.write_seq();

    let order2 = order.clone();
    db.run(|ctx| {
        let order = order2.clone();
        async move {
            let model = ctx.get(&order.key(json!("A1"))?).await?.unwrap();
            // Reading is not a change.
            assert_eq!(model.get("quantity")?, Some(json!(1)));
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(store.write_seq(), writes_before);
}

#[tokio::test]
async fn equal_ids_in_different_collections_are_distinct_documents() {
    let store = MemoryStore::new();
    let order = order_type();
    let invoice = ModelType::builder("Invoice")
        .key("id", Descriptor::string())
        .field("total", Descriptor::integer())
        .build();
    let db = db_with(&store, &[&order, &invoice]);

    db.run(|ctx| {
        let order = order.clone();
        let invoice = invoice.clone();
        async move {
            ctx.create(
                &order,
                json!({"id": "A1", "product": "coffee", "quantity": 1}),
            )
            .await?;
            ctx.create(&invoice, json!({"id": "A1", "total": 100})).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert!(store
        .peek(&DocumentRef::new("Order", DocumentId::from("A1")))
        .is_some());
    assert!(store
        .peek(&DocumentRef::new("Invoice", DocumentId::from("A1")))
        .is_some());
}

struct StampRevision;

#[async_trait]
impl Finalize for StampRevision {
    async fn finalize(&self, model: Model) -> Result<()> {
        let revision = model
            .get("revision")?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        model.set("revision", json!(revision + 1))
    }
}

#[tokio::test]
async fn finalize_hook_runs_before_every_write() {
    let store = MemoryStore::new();
    let page = ModelType::builder("Page")
        .key("slug", Descriptor::string())
        .field("body", Descriptor::string())
        .field("revision", Descriptor::integer().optional())
        .finalize(StampRevision)
        .build();
    let db = db_with(&store, &[&page]);

    db.run(|ctx| {
        let page = page.clone();
        async move {
            ctx.create(&page, json!({"slug": "home", "body": "hi"})).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    let doc = DocumentRef::new("Page", DocumentId::from("home"));
    assert_eq!(store.peek(&doc).unwrap()["revision"], json!(1));

    let page2 = page.clone();
    db.run(|ctx| {
        let page = page2.clone();
        async move {
            let model = ctx.get(&page.key(json!("home"))?).await?.unwrap();
            model.set("body", json!("hello"))?;
            Ok(())
        }
    })
    .await
    .unwrap();
    assert_eq!(store.peek(&doc).unwrap()["revision"], json!(2));

    // An untouched fetch does not run the hook, so nothing is written.
    let writes_before = store.write_seq();
    let page3 = page.clone();
    db.run(|ctx| {
        let page = page3.clone();
        async move {
            ctx.get(&page.key(json!("home"))?).await?;
            Ok(())
        }
    })
    .await
    .unwrap();
    assert_eq!(store.write_seq(), writes_before);
}

#[tokio::test]
async fn create_after_tracked_get_collides() {
    let store = MemoryStore::new();
    let order = order_type();
    let db = db_with(&store, &[&order]);

    let err = db
        .run(|ctx| {
            let order = order.clone();
            async move {
                // Fetched-absent still occupies the slot.
                assert!(ctx.get(&order.key(json!("A1"))?).await?.is_none());
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
    assert!(err.root_cause().is_model_tracked_twice());
}
