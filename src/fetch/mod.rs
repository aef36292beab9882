//! Remote JSON fetching with TTL caching and private-network protection.
//!
//! # Flow
//!
//! 1. The URL is shape-checked ([`validate_url`]) and its literal host and
//!    port are checked against the [`TargetPolicy`].
//! 2. A live cache entry is returned without touching the network.
//! 3. On a miss the URL is fetched through a client whose DNS resolver and
//!    redirect policy enforce the same [`TargetPolicy`]. Successful JSON is
//!    cached for `ttl` and the URL is recorded as tracked.
//!
//! Failures carry their raw detail for the server log; callers only ever
//! see [`CardError::safe_message`].
//!
//! Tracked URLs are re-fetched by [`RemoteFetchCache::refresh_tracked`],
//! on demand or from [`spawn_refresh_task`].

mod guard;
mod refresh;
mod tracked;

pub use guard::{
    BlockedAddress, DEFAULT_ALLOWED_PORTS, DEFAULT_MAX_REDIRECTS, GuardedResolver, TargetPolicy,
    blocked_reason, guarded_client, is_blocked_ip, redirect_policy, validate_url,
};
pub use refresh::{RefreshReport, spawn_refresh_task};
pub use tracked::{DEFAULT_MAX_TRACKED, TRACKED_URLS_KEY, TrackedUrl, TrackedUrls};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::NetworkErrorKind;
use crate::store::{KvStore, hashed_key};
use crate::telemetry;
use crate::{CardError, Result};

/// Prefix of remote response cache keys.
pub const REMOTE_CACHE_PREFIX: &str = "cardcrafter_cache";

/// Configuration for [`RemoteFetchCache`].
///
/// ```rust
/// # use cardcrafter::FetchConfig;
/// # use std::time::Duration;
/// let config = FetchConfig::default().ttl(Duration::from_secs(600));
/// assert_eq!(config.timeout, Duration::from_secs(15));
/// assert_eq!(config.max_tracked, 50);
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout for interactive fetches.
    pub timeout: Duration,
    /// Timeout for background refresh fetches.
    pub refresh_timeout: Duration,
    /// Lifetime of a cached response.
    pub ttl: Duration,
    pub max_tracked: usize,
    /// Concurrent fetches during a refresh sweep.
    pub refresh_concurrency: usize,
    pub policy: TargetPolicy,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            refresh_timeout: Duration::from_secs(10),
            ttl: Duration::from_secs(3600),
            max_tracked: DEFAULT_MAX_TRACKED,
            refresh_concurrency: 4,
            policy: TargetPolicy::default(),
            user_agent: crate::version::user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn max_tracked(mut self, max: usize) -> Self {
        self.max_tracked = max;
        self
    }

    pub fn refresh_concurrency(mut self, n: usize) -> Self {
        self.refresh_concurrency = n.max(1);
        self
    }

    pub fn policy(mut self, policy: TargetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Outbound JSON fetcher backed by the shared store.
pub struct RemoteFetchCache {
    client: reqwest::Client,
    store: Arc<dyn KvStore>,
    tracked: TrackedUrls,
    config: FetchConfig,
}

impl RemoteFetchCache {
    pub fn new(store: Arc<dyn KvStore>, config: FetchConfig) -> Result<Self> {
        let client = guarded_client(&config.policy, &config.user_agent)?;
        Ok(Self {
            client,
            tracked: TrackedUrls::new(Arc::clone(&store), config.max_tracked),
            store,
            config,
        })
    }

    /// Cache key for a URL: `cardcrafter_cache_<hash>`.
    ///
    /// The hash covers the parsed form of the URL, the same string the
    /// tracked list records, so `http://Example.com` and
    /// `http://example.com/` share an entry.
    pub fn cache_key_for(url: &str) -> String {
        let url = url.trim();
        let canonical = Url::parse(url).map_or_else(|_| url.to_string(), String::from);
        hashed_key(REMOTE_CACHE_PREFIX, &[&canonical])
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn tracked(&self) -> &TrackedUrls {
        &self.tracked
    }

    /// Fetch `url` through the cache, storing the result under `cache_key`.
    pub async fn fetch(&self, url: &str, cache_key: &str) -> Result<Value> {
        let parsed = self.check_target(url)?;

        if let Some(value) = self.store.get(cache_key).await? {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "remote").increment(1);
            debug!(url = %parsed, cache_key, "remote cache hit");
            return Ok(value);
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "remote").increment(1);
        debug!(url = %parsed, cache_key, "remote cache miss");

        let value = self.fetch_uncached(&parsed, self.config.timeout).await?;
        self.store
            .set(cache_key, value.clone(), Some(self.config.ttl))
            .await?;
        let custom_key = (cache_key != Self::cache_key_for(parsed.as_str())).then_some(cache_key);
        self.tracked.record_keyed(parsed.as_str(), custom_key).await?;
        Ok(value)
    }

    /// [`fetch`](Self::fetch) under [`cache_key_for`](Self::cache_key_for).
    pub async fn fetch_cached(&self, url: &str) -> Result<Value> {
        self.fetch(url, &Self::cache_key_for(url)).await
    }

    /// Drop the cached response for `url`.
    pub async fn evict(&self, url: &str) -> Result<bool> {
        self.store.delete(&Self::cache_key_for(url)).await
    }

    fn check_target(&self, url: &str) -> Result<Url> {
        let parsed = validate_url(url)?;
        if let Err(blocked) = self.config.policy.check_url(&parsed) {
            metrics::counter!(telemetry::BLOCKED_TARGETS_TOTAL).increment(1);
            warn!(url = %parsed, reason = blocked.reason, "refusing fetch target");
            return Err(blocked.into());
        }
        Ok(parsed)
    }

    /// GET and parse without consulting or filling the cache.
    ///
    /// No retries: a failure is reported as-is.
    async fn fetch_uncached(&self, url: &Url, timeout: Duration) -> Result<Value> {
        let result = self.send(url, timeout).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::FETCHES_TOTAL, "status" => status).increment(1);
        if let Err(err) = &result {
            if matches!(err, CardError::BlockedTarget(_)) {
                metrics::counter!(telemetry::BLOCKED_TARGETS_TOTAL).increment(1);
            }
            warn!(url = %url, error = %err, "remote fetch failed");
        }
        result
    }

    async fn send(&self, url: &Url, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CardError::Http {
                status: status.as_u16(),
                message: format!("{url} returned HTTP {status}"),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(&e))?;
        match serde_json::from_slice(&body) {
            Ok(Value::Null) => Err(CardError::InvalidJson(format!("{url}: body is null"))),
            Ok(value) => Ok(value),
            Err(e) => Err(CardError::InvalidJson(format!("{url}: {e}"))),
        }
    }
}

/// Map a transport error to a [`CardError`] category.
fn classify(err: &reqwest::Error) -> CardError {
    if let Some(blocked) = guard::blocked_cause(err) {
        return CardError::BlockedTarget(blocked);
    }
    let message = guard::error_chain_text(err);
    let lower = message.to_ascii_lowercase();
    let kind = if err.is_timeout() {
        NetworkErrorKind::Timeout
    } else if ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        NetworkErrorKind::Tls
    } else if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
        NetworkErrorKind::Dns
    } else if err.is_connect() {
        NetworkErrorKind::Connect
    } else {
        NetworkErrorKind::Other
    };
    CardError::Network { kind, message }
}
