use crate::core::cache::{KeyValueCollection, UpdateFn};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expiry| expiry < now)
    }
}

/// In-memory collection; contents are lost when the process exits.
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, CacheValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut entries = self.inner.lock().await;
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => {
                debug!("Cache MISS for key: {}", String::from_utf8_lossy(key));
                return Ok(None);
            }
        };

        if expired {
            debug!("Cache entry expired for key: {}", String::from_utf8_lossy(key));
            entries.remove(key);
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", String::from_utf8_lossy(key));
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let entry = CacheValue {
            value: value.to_vec(),
            expires_at,
        };

        let mut entries = self.inner.lock().await;
        debug!("Cache PUT for key: {}", String::from_utf8_lossy(key));
        entries.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let mut entries = self.inner.lock().await;
        entries.remove(key);
        debug!("Cache REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let now = Instant::now();
        let entries = self.inner.lock().await;
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    async fn update(&self, key: &[u8], f: &mut UpdateFn<'_>) -> Result<()> {
        let mut entries = self.inner.lock().await;
        let current = entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.as_slice());

        if let Some(value) = f(current) {
            debug!("Cache UPDATE for key: {}", String::from_utf8_lossy(key));
            entries.insert(
                key.to_vec(),
                CacheValue {
                    value,
                    expires_at: None,
                },
            );
        }
        Ok(())
    }
}
