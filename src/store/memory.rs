//! In-process store backed by moka with per-entry expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use serde_json::Value;

use super::KvStore;
use crate::Result;
use crate::fetch::REMOTE_CACHE_PREFIX;
use crate::gateway::WP_QUERY_CACHE_PREFIX;

/// Default maximum number of cached responses.
const DEFAULT_MAX_ENTRIES: u64 = 50_000;

/// Length of the digest suffix produced by [`hashed_key`](super::hashed_key).
const DIGEST_LEN: usize = 32;

#[derive(Clone, Debug)]
struct StoredValue {
    value: Value,
    ttl: Option<Duration>,
}

/// Each entry carries its own TTL; overwrites restart the clock.
struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Whether `key` names a cached response that can be rebuilt on a miss:
/// `cardcrafter_cache_<digest>` or `cardcrafter_wp_query_<digest>`.
pub fn is_response_key(key: &str) -> bool {
    [REMOTE_CACHE_PREFIX, WP_QUERY_CACHE_PREFIX].iter().any(|prefix| {
        key.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|digest| {
                digest.len() == DIGEST_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
            })
    })
}

/// Thread-safe in-memory [`KvStore`].
///
/// Cached responses (see [`is_response_key`]) live in a bounded cache
/// (default 50,000 entries) and may be evicted under pressure. Everything
/// else, such as the dependency index, tracked URLs and rate windows, is
/// only ever dropped by its own TTL or an explicit delete.
pub struct MemoryStore {
    responses: Cache<String, StoredValue>,
    state: Cache<String, StoredValue>,
}

impl MemoryStore {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store holding at most `max` cached responses.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            responses: Cache::builder()
                .max_capacity(max)
                .expire_after(PerEntryTtl)
                .build(),
            state: Cache::builder().expire_after(PerEntryTtl).build(),
        }
    }

    fn cache_for(&self, key: &str) -> &Cache<String, StoredValue> {
        if is_response_key(key) {
            &self.responses
        } else {
            &self.state
        }
    }

    /// Approximate number of entries (may include not-yet-swept expired ones).
    pub fn len(&self) -> u64 {
        self.responses.entry_count() + self.state.entry_count()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache_for(key).get(key).await.map(|stored| stored.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.cache_for(key)
            .insert(key.to_string(), StoredValue { value, ttl })
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.cache_for(key).remove(key).await.is_some())
    }

    async fn purge_expired(&self) -> Result<usize> {
        // entry_count is approximate; the delta is informational only.
        let before = self.len();
        self.responses.run_pending_tasks().await;
        self.state.run_pending_tasks().await;
        Ok(before.saturating_sub(self.len()) as usize)
    }
}
