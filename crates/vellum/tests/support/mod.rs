//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use vellum::{Db, Descriptor, ModelType};
use vellum_driver_memory::MemoryStore;

pub fn order_type() -> Arc<ModelType> {
    ModelType::builder("Order")
        .key("id", Descriptor::string())
        .field("product", Descriptor::string())
        .field("quantity", Descriptor::integer().min(0))
        .field("note", Descriptor::string().optional())
        .build()
}

pub fn race_result_type() -> Arc<ModelType> {
    ModelType::builder("RaceResult")
        .key("raceID", Descriptor::integer())
        .key("runnerName", Descriptor::string())
        .field("finish", Descriptor::integer().optional())
        .build()
}

pub fn config_type() -> Arc<ModelType> {
    ModelType::builder("Config")
        .key("id", Descriptor::string())
        .field("aNonNegInt", Descriptor::integer().min(0))
        .field(
            "immutableInt",
            Descriptor::integer()
                .immutable()
                .default_value(serde_json::json!(5)),
        )
        .build()
}

pub fn db_with(store: &MemoryStore, models: &[&Arc<ModelType>]) -> Db {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut builder = Db::builder();
    for model in models {
        builder.register(model);
    }
    builder.build(store.clone()).unwrap()
}
