//! The tracked-URL list consulted by the background refresh.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::store::KvStore;

/// Store key of the tracked-URL list.
pub const TRACKED_URLS_KEY: &str = "cardcrafter_tracked_urls";

/// Default bound on the tracked-URL list.
pub const DEFAULT_MAX_TRACKED: usize = 50;

/// One tracked URL and, when it was cached under a caller-chosen key, that
/// key. Entries without a key refresh under
/// [`RemoteFetchCache::cache_key_for`](super::RemoteFetchCache::cache_key_for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl TrackedUrl {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(url) => Some(Self {
                url,
                cache_key: None,
            }),
            other => serde_json::from_value(other).ok(),
        }
    }

    fn into_value(self) -> Value {
        match self.cache_key {
            None => Value::String(self.url),
            Some(key) => serde_json::json!({ "url": self.url, "cache_key": key }),
        }
    }
}

/// Ordered list of distinct URLs, least recently seen first.
///
/// Recording a URL already present moves it to the most-recent end. When
/// the list is over capacity the least recently seen URLs are dropped.
#[derive(Clone)]
pub struct TrackedUrls {
    store: Arc<dyn KvStore>,
    max: usize,
}

impl TrackedUrls {
    pub fn new(store: Arc<dyn KvStore>, max: usize) -> Self {
        Self {
            store,
            max: max.max(1),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.entries().await?.into_iter().map(|e| e.url).collect())
    }

    pub async fn entries(&self) -> Result<Vec<TrackedUrl>> {
        let entries = match self.store.get(TRACKED_URLS_KEY).await? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(TrackedUrl::from_value)
                .collect(),
            _ => Vec::new(),
        };
        Ok(entries)
    }

    /// Mark `url` as most recently seen.
    pub async fn record(&self, url: &str) -> Result<()> {
        self.record_keyed(url, None).await
    }

    /// Mark `url` as most recently seen, refreshing into `cache_key`
    /// instead of the default key when one is given.
    pub async fn record_keyed(&self, url: &str, cache_key: Option<&str>) -> Result<()> {
        let mut entries = self.entries().await?;
        entries.retain(|e| e.url != url);
        entries.push(TrackedUrl {
            url: url.to_string(),
            cache_key: cache_key.map(str::to_string),
        });
        if entries.len() > self.max {
            let excess = entries.len() - self.max;
            entries.drain(..excess);
        }
        self.save(entries).await
    }

    pub async fn remove(&self, url: &str) -> Result<bool> {
        let mut entries = self.entries().await?;
        let before = entries.len();
        entries.retain(|e| e.url != url);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(entries).await?;
        Ok(true)
    }

    async fn save(&self, entries: Vec<TrackedUrl>) -> Result<()> {
        let value = Value::Array(entries.into_iter().map(TrackedUrl::into_value).collect());
        self.store.set(TRACKED_URLS_KEY, value, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracked(max: usize) -> TrackedUrls {
        TrackedUrls::new(Arc::new(MemoryStore::new()), max)
    }

    #[tokio::test]
    async fn keeps_distinct_urls_in_recency_order() {
        let urls = tracked(10);
        urls.record("https://a.test").await.unwrap();
        urls.record("https://b.test").await.unwrap();
        urls.record("https://a.test").await.unwrap();
        assert_eq!(urls.list().await.unwrap(), vec!["https://b.test", "https://a.test"]);
    }

    #[tokio::test]
    async fn evicts_least_recently_seen() {
        let urls = tracked(3);
        for n in 0..5 {
            urls.record(&format!("https://{n}.test")).await.unwrap();
        }
        assert_eq!(
            urls.list().await.unwrap(),
            vec!["https://2.test", "https://3.test", "https://4.test"]
        );
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let urls = tracked(3);
        urls.record("https://a.test").await.unwrap();
        assert!(urls.remove("https://a.test").await.unwrap());
        assert!(!urls.remove("https://a.test").await.unwrap());
        assert!(urls.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_keys_are_kept_per_url() {
        let urls = tracked(3);
        urls.record("https://a.test/").await.unwrap();
        urls.record_keyed("https://b.test/", Some("widget_7")).await.unwrap();

        let entries = urls.entries().await.unwrap();
        assert_eq!(entries[0].cache_key, None);
        assert_eq!(entries[1].cache_key.as_deref(), Some("widget_7"));

        // Re-seen without a custom key, the default key applies again.
        urls.record("https://b.test/").await.unwrap();
        assert_eq!(urls.entries().await.unwrap()[1].cache_key, None);
    }
}
