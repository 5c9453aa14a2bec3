pub mod disk;
pub mod memory;
pub mod ops;

use crate::core::engine::Engine;
use crate::core::error::{Error, Result};
use crate::core::schema::Schema;
use disk::DiskEngine;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryEngine;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::debug;

/// A thread-safe document store holding one engine per collection.
pub struct CollectionStore {
    collections: RwLock<HashMap<String, Arc<dyn Engine>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl CollectionStore {
    /// Collections live in memory and vanish with the store.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    /// Collections are fjall partitions of a keyspace at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let keyspace = fjall::Config::new(path).open()?;
        debug!("Opened keyspace at {}", path.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// Returns the engine for `name`, creating it with `schema` on first use.
    /// A collection keeps the schema it was created with.
    pub fn collection(&self, name: &str, schema: &Schema) -> Result<Arc<dyn Engine>> {
        if let Some(engine) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(engine.clone());
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = collections.get(name) {
            return Ok(engine.clone());
        }

        let engine: Arc<dyn Engine> = match &self.keyspace {
            Some(keyspace) => {
                if !is_partition_name(name) {
                    return Err(Error::invalid(
                        "collection name",
                        "1-512 characters of [A-Za-z0-9_#$-]",
                    ));
                }
                let partition = keyspace.open_partition(name, PartitionCreateOptions::default())?;
                Arc::new(DiskEngine::new(schema.clone(), partition))
            }
            None => Arc::new(MemoryEngine::new(schema.clone())),
        };
        debug!("Created collection {}", name);
        collections.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Forgets the engine for `name`. Persisted records stay on disk.
    pub fn remove_collection(&self, name: &str) -> bool {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

// fjall panics on partition names outside this set
fn is_partition_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 512
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '#' | '$'))
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
