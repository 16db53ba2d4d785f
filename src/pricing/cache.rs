use crate::core::cache::{KeyValueCollection, Store};
use crate::core::config::PricingConfig;
use crate::core::price::{PricePoint, Timeframe};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COLLECTION: &str = "price_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub series: Vec<PricePoint>,
    pub fetched_at: DateTime<Utc>,
    pub timeframe: Timeframe,
}

/// Resampled price series keyed by request. Freshness depends on the
/// timeframe; stale entries stay readable as a fallback until swept.
///
/// Store failures never surface from reads or writes: they are logged and
/// treated as a miss or a dropped write.
#[derive(Clone)]
pub struct PriceCache {
    collection: Arc<dyn KeyValueCollection>,
    config: PricingConfig,
}

impl PriceCache {
    pub fn new(store: &dyn Store, config: &PricingConfig) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {}", COLLECTION))?;
        Ok(Self {
            collection,
            config: config.clone(),
        })
    }

    pub async fn get(&self, key: &str, timeframe: Timeframe) -> Option<Vec<PricePoint>> {
        self.get_at(key, timeframe, Utc::now()).await
    }

    pub async fn get_at(
        &self,
        key: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<Vec<PricePoint>> {
        let entry = self.load(key).await?;
        let age = now - entry.fetched_at;
        if age < self.config.cache_duration(timeframe) {
            debug!(key, age_secs = age.num_seconds(), "Fresh cached series");
            Some(entry.series)
        } else {
            debug!(key, age_secs = age.num_seconds(), "Cached series is stale");
            None
        }
    }

    /// Last stored series for `key`, however old.
    pub async fn get_stale(&self, key: &str) -> Option<Vec<PricePoint>> {
        self.load(key).await.map(|entry| entry.series)
    }

    pub async fn set(&self, key: &str, series: &[PricePoint], timeframe: Timeframe) {
        self.set_at(key, series, timeframe, Utc::now()).await
    }

    pub async fn set_at(
        &self,
        key: &str,
        series: &[PricePoint],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            key: key.to_string(),
            series: series.to_vec(),
            fetched_at: now,
            timeframe,
        };
        let res: Result<()> = async {
            let bytes = serde_json::to_vec(&entry)?;
            self.collection.put(key.as_bytes(), &bytes, None).await
        }
        .await;
        if let Err(e) = res {
            warn!(key, "Failed to write cached series: {e:#}");
        }
    }

    /// Removes every entry fetched more than `max_age` before `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = now - max_age;
        let mut removed = 0;
        for (key, raw) in self.collection.scan_prefix(b"").await? {
            let expired = match serde_json::from_slice::<CacheEntry>(&raw) {
                Ok(entry) => entry.fetched_at < cutoff,
                Err(e) => {
                    debug!(
                        "Dropping unreadable entry {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    );
                    true
                }
            };
            if expired {
                self.collection.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn load(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.collection.get(key.as_bytes()).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, "Failed to read cached series: {e:#}");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, "Ignoring unreadable cached series: {e}");
                None
            }
        }
    }
}
