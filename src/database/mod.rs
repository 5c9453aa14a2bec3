//! Database: a collection store plus the models registered on it

pub mod loader;

use crate::core::config::ClientOptions;
use crate::core::error::{Error, Result};
use crate::core::model::Model;
use crate::core::schema::Schema;
use crate::store::CollectionStore;
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub use loader::{SchemaFile, load_schema_file, load_schema_files};

pub struct Database {
    options: ClientOptions,
    store: Arc<CollectionStore>,
    models: RwLock<HashMap<String, Model>>,
}

impl Database {
    /// Opens the configured store and, when `use_files` is set, registers a
    /// model for every schema file in `schema_folder_path`.
    ///
    /// Async so that models with a TTL field start their expiry clock on the
    /// caller's runtime.
    pub async fn connect(options: ClientOptions) -> anyhow::Result<Self> {
        let store = match options.data_path()? {
            Some(path) => CollectionStore::open(&path)
                .with_context(|| format!("Failed to open store at {}", path.display()))?,
            None => CollectionStore::in_memory(),
        };
        let database = Self::from_store(options, Arc::new(store));

        if database.options.use_files {
            let folder = database
                .options
                .schema_folder_path
                .as_deref()
                .context("`use_files` requires `schema_folder_path`")?;
            let files = load_schema_files(Path::new(folder), &database.options.ignored_files)?;
            for file in files {
                let name = file.name.clone();
                database
                    .add_schema(&file.name, file.schema)
                    .with_context(|| format!("Failed to register schema {name}"))?;
            }
        }

        info!(
            models = database.models().len(),
            persistent = database.store.is_persistent(),
            "Database connected"
        );
        Ok(database)
    }

    pub fn from_store(options: ClientOptions, store: Arc<CollectionStore>) -> Self {
        Self {
            options,
            store,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Registers a model for collection `name`. A model already registered
    /// under that name is destroyed and replaced.
    pub fn add_schema<S>(&self, name: &str, schema: S) -> Result<Model>
    where
        S: TryInto<Schema>,
        Error: From<S::Error>,
    {
        if name.is_empty() {
            return Err(Error::invalid("name", "a non-empty string"));
        }
        let schema = schema.try_into()?;
        let engine = self.store.collection(name, &schema)?;
        let model = Model::new(name, engine, &schema, self.options.make_cache);

        let previous = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), model.clone());
        if let Some(previous) = previous {
            previous.destroy();
        }
        debug!("Registered model {}", name);
        Ok(model)
    }

    pub fn add_schemas<I, N, S>(&self, schemas: I) -> Result<Vec<Model>>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: TryInto<Schema>,
        Error: From<S::Error>,
    {
        schemas
            .into_iter()
            .map(|(name, schema)| self.add_schema(name.as_ref(), schema))
            .collect()
    }

    pub fn model(&self, name: &str) -> Option<Model> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered models, ordered by name.
    pub fn models(&self) -> Vec<Model> {
        let mut models: Vec<_> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        models.sort_by(|a, b| a.name().cmp(b.name()));
        models
    }

    /// Stops every model's expiry clock and forgets the models. Idempotent.
    pub fn disconnect(&self) {
        let models = std::mem::take(
            &mut *self
                .models
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for model in models.values() {
            model.destroy();
        }
        debug!("Disconnected {} models", models.len());
    }
}
