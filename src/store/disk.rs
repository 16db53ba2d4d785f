use crate::core::cache::{KeyValueCollection, UpdateFn};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

impl CacheEntry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// Collection persisted in a fjall partition. Survives process restarts.
pub struct DiskCollection {
    partition: PartitionHandle,
    // Serialises read-modify-write cycles issued through `update`.
    write_lock: Mutex<()>,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self {
            partition,
            write_lock: Mutex::new(()),
        }
    }

    fn read_live(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.partition.get(key)? else {
            debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
            return Ok(None);
        };

        let entry: CacheEntry = serde_json::from_slice(&raw)
            .with_context(|| format!("Corrupt entry for key: {}", String::from_utf8_lossy(key)))?;
        if entry.is_expired(SystemTime::now()) {
            debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
            self.partition.remove(key)?;
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
        Ok(Some(entry.value))
    }

    fn write(&self, key: &[u8], value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| SystemTime::now() + d);
        let entry = CacheEntry { value, expires_at };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read_live(key)
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(key, value.to_vec(), ttl)
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.partition.remove(key)?;
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let now = SystemTime::now();
        let mut entries = Vec::new();
        for item in self.partition.prefix(prefix) {
            let (key, raw) = item?;
            match serde_json::from_slice::<CacheEntry>(&raw) {
                Ok(entry) if !entry.is_expired(now) => entries.push((key.to_vec(), entry.value)),
                Ok(_) => {}
                Err(e) => debug!(
                    "Skipping corrupt entry {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        Ok(entries)
    }

    async fn update(&self, key: &[u8], f: &mut UpdateFn<'_>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.read_live(key)?;
        if let Some(value) = f(current.as_deref()) {
            self.write(key, value, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::{Config, Keyspace, PartitionCreateOptions};
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn open_collection(path: &std::path::Path) -> (Keyspace, DiskCollection) {
        let keyspace = Config::new(path).open().unwrap();
        let partition = keyspace
            .open_partition("test_partition", PartitionCreateOptions::default())
            .unwrap();
        (keyspace, DiskCollection::new(partition))
    }

    #[tokio::test]
    async fn test_disk_collection_get_put() {
        let dir = tempdir().unwrap();
        let (_keyspace, collection) = open_collection(dir.path());

        // Initially, collection is empty
        assert!(collection.get(b"key1").await.unwrap().is_none());

        collection.put(b"key1", b"123", None).await.unwrap();
        assert_eq!(collection.get(b"key1").await.unwrap(), Some(b"123".to_vec()));

        // Get a non-existent key
        assert!(collection.get(b"key2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_collection_ttl_expiration() {
        let dir = tempdir().unwrap();
        let (_keyspace, collection) = open_collection(dir.path());

        collection
            .put(b"key1", b"123", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(collection.get(b"key1").await.unwrap().is_some());

        // Wait for TTL expiration
        sleep(Duration::from_millis(20)).await;
        assert!(collection.get(b"key1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_collection_scan_prefix_and_remove() {
        let dir = tempdir().unwrap();
        let (_keyspace, collection) = open_collection(dir.path());

        collection.put(b"a/1", b"x", None).await.unwrap();
        collection.put(b"a/2", b"y", None).await.unwrap();
        collection.put(b"b/1", b"z", None).await.unwrap();

        let scanned = collection.scan_prefix(b"a/").await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0], (b"a/1".to_vec(), b"x".to_vec()));

        collection.remove(b"a/1").await.unwrap();
        assert_eq!(collection.scan_prefix(b"a/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disk_collection_update() {
        let dir = tempdir().unwrap();
        let (_keyspace, collection) = open_collection(dir.path());

        for _ in 0..3 {
            collection
                .update(b"counter", &mut |current| {
                    let count = current
                        .and_then(|raw| std::str::from_utf8(raw).ok())
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(0);
                    Some((count + 1).to_string().into_bytes())
                })
                .await
                .unwrap();
        }

        assert_eq!(collection.get(b"counter").await.unwrap(), Some(b"3".to_vec()));
    }
}
