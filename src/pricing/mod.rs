//! Rate-limited, cache-backed price series pipeline

pub mod cache;
pub mod quota;
pub mod rate_limit;
pub mod sweeper;

use crate::core::config::AppConfig;
use crate::core::error::{FetchError, PriceError};
use crate::core::price::{PricePoint, PriceRequest, PriceSeriesProvider};
use crate::core::series::resample;
use crate::store::KeyValueStore;
use anyhow::Result;
use cache::PriceCache;
use quota::QuotaGuard;
use rate_limit::{Acquire, RateLimiter};
use std::collections::HashMap;
use std::sync::Arc;
use sweeper::{CleanupSweeper, SweepTrigger};
use tracing::{debug, instrument, warn};

/// Rate limiter key shared by every call to the upstream price API.
pub const UPSTREAM_LIMITER_KEY: &str = "coingecko_market_chart";

/// Serves price series for a token, preferring fresh cache, then a live
/// upstream fetch, then whatever was cached last.
///
/// Each request walks quota check, cache lookup, rate limit, fetch, cache
/// write and an optional cleanup request. Any failure along the way falls
/// back to the last cached series for the key before giving up.
pub struct PriceService {
    provider: Arc<dyn PriceSeriesProvider>,
    cache: PriceCache,
    limiter: RateLimiter,
    quota: QuotaGuard,
    token_ids: HashMap<String, String>,
    cleanup_probability: f64,
    sweep_trigger: Option<SweepTrigger>,
}

impl PriceService {
    pub fn new(
        provider: Arc<dyn PriceSeriesProvider>,
        store: &KeyValueStore,
        config: &AppConfig,
    ) -> Result<Self> {
        let pricing = &config.pricing;
        Ok(Self {
            provider,
            cache: PriceCache::new(store, pricing)?,
            limiter: RateLimiter::new(store, pricing.rate_limit_per_minute)?,
            quota: QuotaGuard::new(store, pricing.monthly_ceiling())?,
            token_ids: config.token_ids.clone(),
            cleanup_probability: pricing.cleanup_probability,
            sweep_trigger: None,
        })
    }

    /// Lets successful fetches request a cleanup pass from a background
    /// sweeper.
    pub fn with_sweep_trigger(mut self, trigger: SweepTrigger) -> Self {
        self.sweep_trigger = Some(trigger);
        self
    }

    /// Sweeper over the same collections this service writes to.
    pub fn sweeper(&self, max_age: chrono::Duration) -> CleanupSweeper {
        CleanupSweeper::new(self.cache.clone(), self.quota.clone(), max_age)
    }

    pub fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn coin_id<'a>(&'a self, token_id: &'a str) -> &'a str {
        self.token_ids
            .get(token_id)
            .map(String::as_str)
            .unwrap_or(token_id)
    }

    #[instrument(
        name = "PriceSeries",
        skip(self, request),
        fields(token = %request.token_id, timeframe = %request.timeframe, interval = %request.interval)
    )]
    pub async fn get_prices(&self, request: &PriceRequest) -> Result<Vec<PricePoint>, FetchError> {
        if request.token_id.trim().is_empty() {
            return Err(PriceError::InvalidRequest("token id must not be empty".to_string()).into());
        }

        let key = request.cache_key();
        match self.fetch_live(request, &key).await {
            Ok(series) => Ok(series),
            Err(cause) => self.fallback(&key, cause).await,
        }
    }

    async fn fetch_live(
        &self,
        request: &PriceRequest,
        key: &str,
    ) -> Result<Vec<PricePoint>, PriceError> {
        self.quota.check().await?;

        if let Some(series) = self.cache.get(key, request.timeframe).await {
            return Ok(series);
        }

        if self.limiter.try_acquire(UPSTREAM_LIMITER_KEY).await? == Acquire::Denied {
            return Err(PriceError::RateLimitExceeded {
                key: UPSTREAM_LIMITER_KEY.to_string(),
                limit: self.limiter.limit(),
            });
        }
        if let Err(e) = self.quota.record().await {
            warn!("Failed to record upstream call: {e:#}");
        }

        let coin_id = self.coin_id(&request.token_id);
        let raw = self
            .provider
            .fetch_series(coin_id, request.timeframe.days())
            .await?;
        if raw.is_empty() {
            return Err(PriceError::EmptyResult {
                coin_id: coin_id.to_string(),
            });
        }

        let series = resample(&raw, request.interval.millis());
        debug!(raw = raw.len(), kept = series.len(), "Resampled series");
        self.cache.set(key, &series, request.timeframe).await;
        self.maybe_request_cleanup();

        Ok(series)
    }

    async fn fallback(&self, key: &str, cause: PriceError) -> Result<Vec<PricePoint>, FetchError> {
        match self.cache.get_stale(key).await {
            Some(series) => {
                warn!(key, "Serving cached series after failure: {cause}");
                Ok(series)
            }
            None => Err(FetchError::new(cause)),
        }
    }

    fn maybe_request_cleanup(&self) {
        let Some(trigger) = &self.sweep_trigger else {
            return;
        };
        if rand::random::<f64>() < self.cleanup_probability {
            debug!("Requesting cleanup sweep");
            trigger.request();
        }
    }
}
