//! Content-type keyed cache invalidation.
//!
//! Rendered native-query results are registered against the content type
//! they were built from. A mutation of that type evicts every registered
//! key and clears the set. The index itself lives in the shared store
//! under [`DEPENDENCY_INDEX_KEY`] as `{content_type: [cache_key, ...]}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::KvStore;
use crate::telemetry;
use crate::{CardError, Result};

/// Store key of the dependency index.
pub const DEPENDENCY_INDEX_KEY: &str = "cardcrafter_cache_keys";

/// Store key of the maintenance throttle marker.
pub const CLEANUP_MARKER_KEY: &str = "cardcrafter_cache_cleanup_last_run";

/// Minimum spacing of expired-entry sweeps.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// What happened to a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
    Trashed,
    Restored,
    /// Revision snapshot; not a visible change.
    Revision,
    /// Editor autosave; not a visible change.
    Autosave,
}

impl MutationKind {
    /// Revisions and autosaves never change published output.
    pub fn is_pseudo(self) -> bool {
        matches!(self, MutationKind::Revision | MutationKind::Autosave)
    }
}

/// A content mutation reported by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEvent {
    pub kind: MutationKind,
    pub content_type: String,
    #[serde(default)]
    pub content_id: Option<u64>,
}

impl ContentEvent {
    pub fn new(kind: MutationKind, content_type: impl Into<String>) -> Self {
        Self {
            kind,
            content_type: content_type.into(),
            content_id: None,
        }
    }

    pub fn id(mut self, content_id: u64) -> Self {
        self.content_id = Some(content_id);
        self
    }
}

type DependencyIndex = BTreeMap<String, Vec<String>>;

/// Registry of cache keys per content type.
pub struct CacheInvalidationRegistry {
    store: Arc<dyn KvStore>,
    cleanup_interval: Duration,
}

impl CacheInvalidationRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Record that `cache_key` was built from `content_type` content.
    pub async fn register_dependency(&self, cache_key: &str, content_type: &str) -> Result<()> {
        let mut index = self.load().await?;
        let keys = index.entry(content_type.to_string()).or_default();
        if keys.iter().any(|k| k == cache_key) {
            return Ok(());
        }
        keys.push(cache_key.to_string());
        self.save(&index).await
    }

    /// Keys currently registered for `content_type`.
    pub async fn keys_for(&self, content_type: &str) -> Result<Vec<String>> {
        Ok(self.load().await?.remove(content_type).unwrap_or_default())
    }

    /// Evict every key registered for `content_type` and clear its set.
    /// Returns how many keys were registered.
    pub async fn invalidate(&self, content_type: &str) -> Result<usize> {
        let mut index = self.load().await?;
        let keys = index.remove(content_type).unwrap_or_default();
        for key in &keys {
            self.store.delete(key).await?;
        }
        if !keys.is_empty() {
            self.save(&index).await?;
            metrics::counter!(telemetry::INVALIDATIONS_TOTAL, "content_type" => content_type.to_string())
                .increment(keys.len() as u64);
            info!(content_type, evicted = keys.len(), "cache invalidated");
        }

        if let Err(err) = self.run_maintenance().await {
            warn!(error = %err, "cache maintenance failed");
        }
        Ok(keys.len())
    }

    /// Mutation hook. Pseudo events (revisions, autosaves) are ignored.
    pub async fn on_content_mutated(&self, event: &ContentEvent) -> Result<usize> {
        if event.kind.is_pseudo() {
            debug!(kind = ?event.kind, content_type = %event.content_type, "ignoring pseudo mutation");
            return Ok(0);
        }
        self.invalidate(&event.content_type).await
    }

    /// Sweep expired store entries unless a sweep ran within the cleanup
    /// interval. Returns the number purged, or `None` when throttled.
    pub async fn run_maintenance(&self) -> Result<Option<usize>> {
        if self.store.get(CLEANUP_MARKER_KEY).await?.is_some() {
            return Ok(None);
        }
        let now = chrono::Utc::now().timestamp();
        self.store
            .set(CLEANUP_MARKER_KEY, Value::from(now), Some(self.cleanup_interval))
            .await?;
        let purged = self.store.purge_expired().await?;
        debug!(purged, "expired cache entries swept");
        Ok(Some(purged))
    }

    async fn load(&self) -> Result<DependencyIndex> {
        match self.store.get(DEPENDENCY_INDEX_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| CardError::Store(format!("corrupt dependency index: {e}"))),
            None => Ok(DependencyIndex::new()),
        }
    }

    async fn save(&self, index: &DependencyIndex) -> Result<()> {
        self.store
            .set(DEPENDENCY_INDEX_KEY, serde_json::to_value(index)?, None)
            .await
    }
}
