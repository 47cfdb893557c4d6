use super::{Db, Shared};
use crate::model_type::ModelType;

use vellum_core::{store::DocumentStore, Error, Result};

use indexmap::IndexMap;
use std::sync::Arc;

/// Wires a document store and the application's model types into a [`Db`].
#[derive(Default)]
pub struct Builder {
    models: Vec<Arc<ModelType>>,
}

impl Builder {
    /// Registers a model type.
    pub fn register(&mut self, model: &Arc<ModelType>) -> &mut Self {
        self.models.push(model.clone());
        self
    }

    /// Builds the handle around a driver.
    pub fn build(&mut self, store: impl DocumentStore) -> Result<Db> {
        self.build_shared(Arc::new(store))
    }

    /// Builds the handle around an already-shared driver.
    pub fn build_shared(&mut self, store: Arc<dyn DocumentStore>) -> Result<Db> {
        let mut models = IndexMap::with_capacity(self.models.len());
        for model in &self.models {
            let collection = model.collection().to_string();
            if models.insert(collection.clone(), model.clone()).is_some() {
                return Err(Error::invalid_parameter(format!(
                    "collection `{collection}` is registered twice"
                )));
            }
        }
        Ok(Db::from_shared(Shared { store, models }))
    }
}
