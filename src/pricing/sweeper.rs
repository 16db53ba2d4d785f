use crate::pricing::cache::PriceCache;
use crate::pricing::quota::QuotaGuard;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries_removed: usize,
    pub usage_records_removed: usize,
}

/// Asks the background sweeper for an extra pass. Requests made while a pass
/// is running coalesce into one follow-up pass.
#[derive(Clone, Default)]
pub struct SweepTrigger {
    notify: Arc<Notify>,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Evicts cached series older than the max age and usage records of past
/// months.
#[derive(Clone)]
pub struct CleanupSweeper {
    cache: PriceCache,
    quota: QuotaGuard,
    max_age: chrono::Duration,
}

impl CleanupSweeper {
    pub fn new(cache: PriceCache, quota: QuotaGuard, max_age: chrono::Duration) -> Self {
        Self {
            cache,
            quota,
            max_age,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let report = SweepReport {
            cache_entries_removed: self.cache.sweep_at(now, self.max_age).await?,
            usage_records_removed: self.quota.prune_previous_months_at(now).await?,
        };
        info!(
            cache_entries = report.cache_entries_removed,
            usage_records = report.usage_records_removed,
            "Cleanup sweep finished"
        );
        Ok(report)
    }

    /// Runs the sweeper on a tokio task every `period`, plus once per
    /// request made through the returned handle's trigger.
    pub fn spawn(self, period: Duration) -> SweeperHandle {
        let trigger = SweepTrigger::new();
        let shutdown = Arc::new(Notify::new());

        let task = {
            let trigger = trigger.clone();
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; skip it.
                ticker.tick().await;

                loop {
                    // A pending request is served before shutdown.
                    tokio::select! {
                        biased;
                        _ = trigger.requested() => debug!("Requested cleanup sweep"),
                        _ = shutdown.notified() => {
                            debug!("Cleanup sweeper shutting down");
                            break;
                        }
                        _ = ticker.tick() => debug!("Scheduled cleanup sweep"),
                    }
                    if let Err(e) = self.sweep().await {
                        warn!("Cleanup sweep failed: {e:#}");
                    }
                }
            })
        };

        SweeperHandle {
            trigger,
            shutdown,
            task,
        }
    }
}

pub struct SweeperHandle {
    trigger: SweepTrigger,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn trigger(&self) -> SweepTrigger {
        self.trigger.clone()
    }

    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!("Cleanup sweeper task failed: {e}");
        }
    }
}
