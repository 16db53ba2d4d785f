use crate::core::cache::{KeyValueCollection, Store};
use crate::core::error::PriceError;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const COLLECTION: &str = "api_usage";

// Records outlive the month they count towards by a comfortable margin.
const RECORD_TTL: Duration = Duration::from_secs(62 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub used: u64,
    pub ceiling: u64,
}

impl QuotaUsage {
    pub fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.ceiling
    }
}

/// Monthly call budget. Usage is derived by counting one record per upstream
/// call under the current calendar month (UTC).
///
/// The check is advisory: a call recorded between another caller's count and
/// its fetch can push usage slightly over the ceiling.
#[derive(Clone)]
pub struct QuotaGuard {
    collection: Arc<dyn KeyValueCollection>,
    ceiling: u64,
    // Random per guard so concurrent processes never share a record key.
    instance: u32,
    sequence: Arc<AtomicU64>,
}

fn month_prefix(now: DateTime<Utc>) -> String {
    now.format("%Y-%m/").to_string()
}

impl QuotaGuard {
    pub fn new(store: &dyn Store, ceiling: u64) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {}", COLLECTION))?;
        Ok(Self {
            collection,
            ceiling,
            instance: rand::random(),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub async fn usage_at(&self, now: DateTime<Utc>) -> Result<QuotaUsage> {
        let records = self
            .collection
            .scan_prefix(month_prefix(now).as_bytes())
            .await?;
        Ok(QuotaUsage {
            used: records.len() as u64,
            ceiling: self.ceiling,
        })
    }

    pub async fn usage(&self) -> Result<QuotaUsage> {
        self.usage_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<(), PriceError> {
        let usage = self.usage_at(now).await?;
        if usage.is_exhausted() {
            warn!(used = usage.used, ceiling = usage.ceiling, "Monthly quota exhausted");
            return Err(PriceError::QuotaExceeded {
                used: usage.used,
                ceiling: usage.ceiling,
            });
        }
        debug!(used = usage.used, ceiling = usage.ceiling, "Monthly quota ok");
        Ok(())
    }

    pub async fn check(&self) -> Result<(), PriceError> {
        self.check_at(Utc::now()).await
    }

    /// Counts one upstream call against the month of `now`.
    pub async fn record_at(&self, now: DateTime<Utc>) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "{}{:013}-{:08x}-{:06}",
            month_prefix(now),
            now.timestamp_millis(),
            self.instance,
            sequence
        );
        self.collection
            .put(key.as_bytes(), b"1", Some(RECORD_TTL))
            .await
    }

    pub async fn record(&self) -> Result<()> {
        self.record_at(Utc::now()).await
    }

    /// Deletes usage records that belong to months before the one of `now`.
    pub async fn prune_previous_months_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let current = month_prefix(now);
        let mut removed = 0;
        for (key, _) in self.collection.scan_prefix(b"").await? {
            if !key.starts_with(current.as_bytes()) {
                self.collection.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_usage_counts_only_current_month() {
        let guard = QuotaGuard::new(&KeyValueStore::in_memory(), 10).unwrap();

        guard.record_at(at(2026, 9, 30)).await.unwrap();
        guard.record_at(at(2026, 10, 1)).await.unwrap();
        guard.record_at(at(2026, 10, 1)).await.unwrap();
        guard.record_at(at(2026, 10, 19)).await.unwrap();

        let usage = guard.usage_at(at(2026, 10, 20)).await.unwrap();
        assert_eq!(usage, QuotaUsage { used: 3, ceiling: 10 });
        assert_eq!(usage.remaining(), 7);

        // A new month starts from zero
        assert_eq!(guard.usage_at(at(2026, 11, 1)).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_check_fails_once_ceiling_reached() {
        let guard = QuotaGuard::new(&KeyValueStore::in_memory(), 2).unwrap();
        let now = at(2026, 10, 19);

        guard.record_at(now).await.unwrap();
        assert!(guard.check_at(now).await.is_ok());

        guard.record_at(now).await.unwrap();
        let err = guard.check_at(now).await.unwrap_err();
        assert!(matches!(err, PriceError::QuotaExceeded { used: 2, ceiling: 2 }));
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_exhausted() {
        let guard = QuotaGuard::new(&KeyValueStore::in_memory(), 0).unwrap();
        assert!(guard.check().await.is_err());
    }

    #[tokio::test]
    async fn test_guards_sharing_a_store_never_overwrite_records() {
        let store = KeyValueStore::in_memory();
        let first = QuotaGuard::new(&store, 10).unwrap();
        let second = QuotaGuard::new(&store, 10).unwrap();
        let now = at(2026, 10, 19);

        first.record_at(now).await.unwrap();
        second.record_at(now).await.unwrap();

        assert_eq!(first.usage_at(now).await.unwrap().used, 2);
    }

    #[tokio::test]
    async fn test_prune_previous_months() {
        let guard = QuotaGuard::new(&KeyValueStore::in_memory(), 10).unwrap();

        guard.record_at(at(2026, 8, 3)).await.unwrap();
        guard.record_at(at(2026, 9, 30)).await.unwrap();
        guard.record_at(at(2026, 10, 2)).await.unwrap();

        let removed = guard.prune_previous_months_at(at(2026, 10, 19)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(guard.usage_at(at(2026, 10, 19)).await.unwrap().used, 1);
    }
}
