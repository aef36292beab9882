//! Fixed-window rate limiting per identity.
//!
//! Each identity owns one counter in the shared store under
//! `cc_rate_<hash>`. The entry's TTL is the remainder of its window, so an
//! expired window simply reads as absent and the next request opens a new
//! one.

mod identity;

pub use identity::{CLIENT_IP_HEADERS, Identity, RequestContext};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{KvStore, hashed_key};
use crate::telemetry;
use crate::{CardError, Result};

/// Prefix of rate window keys.
pub const RATE_KEY_PREFIX: &str = "cc_rate";

/// Rate limiting configuration.
///
/// ```rust
/// # use cardcrafter::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::default().max_requests(10);
/// assert_eq!(config.window, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per identity per window.
    pub max_requests: u32,
    pub window: Duration,
    /// Derive client addresses from forwarding headers. Disable when the
    /// server is reachable without a trusted proxy in front.
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            trust_forwarded_headers: true,
        }
    }
}

impl RateLimitConfig {
    pub fn max_requests(mut self, max: u32) -> Self {
        self.max_requests = max.max(1);
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// Persisted counter for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u32,
    pub window_start_ms: i64,
}

/// Per-identity request counter over the shared store.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Identity for a request under this limiter's header trust setting.
    pub fn identify(&self, ctx: &RequestContext) -> Identity {
        Identity::from_request(ctx, self.config.trust_forwarded_headers)
    }

    /// Count one request for `identity`. Returns `true` when it is over
    /// quota; a limited request is not counted.
    pub async fn check_and_increment(&self, identity: &Identity) -> Result<bool> {
        Ok(self.hit(identity).await?.is_some())
    }

    /// Like [`check_and_increment`](Self::check_and_increment) but reports
    /// the limit as [`CardError::RateLimited`] with the time left in the
    /// window.
    pub async fn acquire(&self, identity: &Identity) -> Result<()> {
        match self.hit(identity).await? {
            None => Ok(()),
            Some(retry_after) => Err(CardError::RateLimited {
                retry_after: Some(retry_after),
            }),
        }
    }

    /// Current window for `identity`, if one is open.
    pub async fn window_for(&self, identity: &Identity) -> Result<Option<RateWindow>> {
        let key = Self::key_for(identity);
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    fn key_for(identity: &Identity) -> String {
        hashed_key(RATE_KEY_PREFIX, &[&identity.key_material()])
    }

    /// `Some(remaining)` when limited.
    async fn hit(&self, identity: &Identity) -> Result<Option<Duration>> {
        let key = Self::key_for(identity);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = i64::try_from(self.config.window.as_millis()).unwrap_or(i64::MAX);

        let current = self.window_for(identity).await?.filter(|w| {
            let elapsed = now_ms.saturating_sub(w.window_start_ms);
            (0..window_ms).contains(&elapsed)
        });

        let Some(mut window) = current else {
            let fresh = RateWindow {
                count: 1,
                window_start_ms: now_ms,
            };
            self.store
                .set(&key, serde_json::to_value(fresh)?, Some(self.config.window))
                .await?;
            return Ok(None);
        };

        let elapsed = now_ms - window.window_start_ms;
        let remaining = Duration::from_millis(u64::try_from(window_ms - elapsed).unwrap_or(1).max(1));

        if window.count >= self.config.max_requests {
            metrics::counter!(telemetry::RATE_LIMITED_TOTAL).increment(1);
            debug!(identity = %identity.key_material(), count = window.count, "rate limited");
            return Ok(Some(remaining));
        }

        window.count += 1;
        self.store
            .set(&key, serde_json::to_value(window)?, Some(remaining))
            .await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(max: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryStore::new()),
            RateLimitConfig::default().max_requests(max).window(window),
        )
    }

    #[tokio::test]
    async fn exactly_max_calls_pass() {
        let limiter = limiter(3, Duration::from_secs(60));
        let who = Identity::User(1);
        for _ in 0..3 {
            assert!(!limiter.check_and_increment(&who).await.unwrap());
        }
        assert!(limiter.check_and_increment(&who).await.unwrap());
        assert!(limiter.check_and_increment(&who).await.unwrap());
        assert_eq!(limiter.window_for(&who).await.unwrap().unwrap().count, 3);
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        assert!(!limiter.check_and_increment(&Identity::User(1)).await.unwrap());
        assert!(limiter.check_and_increment(&Identity::User(1)).await.unwrap());
        assert!(!limiter.check_and_increment(&Identity::User(2)).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_reports_retry_after() {
        let limiter = limiter(1, Duration::from_secs(60));
        let who = Identity::User(9);
        limiter.acquire(&who).await.unwrap();
        match limiter.acquire(&who).await {
            Err(CardError::RateLimited {
                retry_after: Some(after),
            }) => assert!(after <= Duration::from_secs(60)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = limiter(1, Duration::from_millis(150));
        let who = Identity::User(3);
        assert!(!limiter.check_and_increment(&who).await.unwrap());
        assert!(limiter.check_and_increment(&who).await.unwrap());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!limiter.check_and_increment(&who).await.unwrap());
    }

    #[test]
    fn keys_use_rate_prefix() {
        assert!(RateLimiter::key_for(&Identity::User(1)).starts_with("cc_rate_"));
    }
}
