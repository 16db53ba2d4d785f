pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use anyhow::{Context, Result};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, warn};

/// A thread-safe key-value store that can hold multiple collections.
///
/// Persistent collections live in a fjall keyspace; without one (see
/// [`KeyValueStore::in_memory`]) every collection is held in memory.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens (or creates) the on-disk keyspace under `data_path/cache`.
    pub fn open(data_path: &Path) -> Result<Self> {
        let cache_dir = data_path.join("cache");
        let keyspace = fjall::Config::new(&cache_dir)
            .open()
            .with_context(|| format!("Failed to open store at {}", cache_dir.display()))?;
        debug!("Opened store at {}", cache_dir.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(keyspace),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    /// Syncs journaled writes to disk. A no-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        if let Some(keyspace) = &self.keyspace {
            keyspace
                .persist(fjall::PersistMode::SyncAll)
                .context("Failed to persist store")?;
        }
        Ok(())
    }

    fn create_collection(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>> {
        if !persist {
            return Some(Arc::new(MemoryCollection::new()));
        }

        match &self.keyspace {
            Some(keyspace) => {
                match keyspace.open_partition(name, PartitionCreateOptions::default()) {
                    Ok(partition) => Some(Arc::new(DiskCollection::new(partition))),
                    Err(e) => {
                        warn!("Failed to open partition {}: {}", name, e);
                        None
                    }
                }
            }
            None => {
                debug!("No keyspace available, keeping {} in memory", name);
                Some(Arc::new(MemoryCollection::new()))
            }
        }
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        if create_if_missing {
            let mut collections = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if !collections.contains_key(name) {
                let collection = self.create_collection(name, persist)?;
                collections.insert(name.to_string(), collection);
            }
        }

        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        collections.get(name).cloned()
    }

    fn remove_collection(&self, name: &str) -> bool {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections.remove(name).is_some()
    }
}
