//! Background refresh of tracked URLs.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{RemoteFetchCache, TrackedUrl, validate_url};
use crate::Result;
use crate::telemetry;

/// Outcome of one refresh sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

impl RemoteFetchCache {
    /// Re-fetch every tracked URL and overwrite its cache entry.
    ///
    /// Uses the refresh timeout and bounded concurrency. A failing URL is
    /// skipped (its previous entry is left to expire) and counted in the
    /// report; it never aborts the sweep.
    pub async fn refresh_tracked(&self) -> Result<RefreshReport> {
        let entries = self.tracked.entries().await?;
        if entries.is_empty() {
            return Ok(RefreshReport::default());
        }

        let outcomes: Vec<(String, Result<()>)> = stream::iter(entries)
            .map(|entry| async move {
                let outcome = self.refresh_one(&entry).await;
                (entry.url, outcome)
            })
            .buffer_unordered(self.config.refresh_concurrency.max(1))
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.refreshed += 1;
                    metrics::counter!(telemetry::REFRESHES_TOTAL, "status" => "ok").increment(1);
                }
                Err(err) => {
                    report.failed += 1;
                    metrics::counter!(telemetry::REFRESHES_TOTAL, "status" => "error")
                        .increment(1);
                    debug!(url = %url, error = %err, transient = err.is_transient(), "refresh skipped");
                }
            }
        }
        info!(
            refreshed = report.refreshed,
            failed = report.failed,
            "tracked URL refresh complete"
        );
        Ok(report)
    }

    async fn refresh_one(&self, entry: &TrackedUrl) -> Result<()> {
        let parsed = validate_url(&entry.url)?;
        self.config.policy.check_url(&parsed)?;
        let value = self
            .fetch_uncached(&parsed, self.config.refresh_timeout)
            .await?;
        let key = entry
            .cache_key
            .clone()
            .unwrap_or_else(|| Self::cache_key_for(parsed.as_str()));
        self.store.set(&key, value, Some(self.config.ttl)).await
    }
}

/// Run [`RemoteFetchCache::refresh_tracked`] every `every`, starting one
/// period from now. Abort the handle to stop.
pub fn spawn_refresh_task(cache: Arc<RemoteFetchCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = cache.refresh_tracked().await {
                debug!(error = %err, "refresh sweep failed");
            }
        }
    })
}
