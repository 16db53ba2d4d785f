use crate::core::cache::{KeyValueCollection, Store};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COLLECTION: &str = "rate_limits";

/// Length of the sliding window.
pub const WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Denied,
}

/// Timestamps (ms) of upstream calls granted inside the trailing window.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RateLimitWindow {
    requests: Vec<i64>,
}

impl RateLimitWindow {
    fn decode(raw: Option<&[u8]>) -> Self {
        raw.and_then(|bytes| match serde_json::from_slice(bytes) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("Resetting unreadable rate limit window: {e}");
                None
            }
        })
        .unwrap_or_default()
    }

    fn prune(&mut self, now_ms: i64) {
        self.requests.retain(|ts| now_ms - ts < WINDOW_MS);
    }
}

/// Per-key sliding-window limiter. Windows are stored in a persistent
/// collection so limits carry over process restarts, and every check runs
/// as one read-prune-append-compare update.
#[derive(Clone)]
pub struct RateLimiter {
    collection: Arc<dyn KeyValueCollection>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(store: &dyn Store, limit_per_minute: u32) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {}", COLLECTION))?;
        Ok(Self {
            collection,
            limit: limit_per_minute,
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn try_acquire(&self, key: &str) -> Result<Acquire> {
        self.try_acquire_at(key, Utc::now()).await
    }

    pub async fn try_acquire_at(&self, key: &str, now: DateTime<Utc>) -> Result<Acquire> {
        let now_ms = now.timestamp_millis();
        let limit = self.limit as usize;
        let mut decision = Acquire::Denied;
        let mut in_window = 0;

        self.collection
            .update(key.as_bytes(), &mut |current| {
                let mut window = RateLimitWindow::decode(current);
                window.prune(now_ms);
                in_window = window.requests.len();
                if window.requests.len() >= limit {
                    decision = Acquire::Denied;
                    // Persist the pruned window even when denying.
                    return serde_json::to_vec(&window).ok();
                }
                window.requests.push(now_ms);
                decision = Acquire::Granted;
                serde_json::to_vec(&window).ok()
            })
            .await?;

        debug!(key, in_window, limit, ?decision, "Rate limit check");
        Ok(decision)
    }

    /// Calls currently counted against `key`.
    pub async fn window_len_at(&self, key: &str, now: DateTime<Utc>) -> Result<usize> {
        let raw = self.collection.get(key.as_bytes()).await?;
        let mut window = RateLimitWindow::decode(raw.as_deref());
        window.prune(now.timestamp_millis());
        Ok(window.requests.len())
    }

    pub async fn window_len(&self, key: &str) -> Result<usize> {
        self.window_len_at(key, Utc::now()).await
    }
}
