//! In-memory content store loaded from a JSON export.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ContentQuery, ContentRecord, ContentStore, FilterValue, OrderBy, SortDirection};
use crate::{CardError, Result};

/// JSON export shape:
///
/// ```json
/// {
///   "posts":   [{"id": 1, "title": "Hello", "published_at": "2024-03-05T10:00:00Z"}],
///   "media":   {"12": "https://site.test/uploads/hello.jpg"},
///   "authors": {"3": "Jane Doe"}
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentExport {
    #[serde(default)]
    pub posts: Vec<ContentRecord>,
    /// Attachment id → URL.
    #[serde(default)]
    pub media: HashMap<u64, String>,
    /// Author id → display name.
    #[serde(default)]
    pub authors: HashMap<u64, String>,
}

/// [`ContentStore`] over an in-memory export.
///
/// Counts calls per operation so callers can check batching behaviour.
#[derive(Debug, Default)]
pub struct StaticContentStore {
    data: RwLock<ContentExport>,
    queries: AtomicUsize,
    image_batches: AtomicUsize,
    author_batches: AtomicUsize,
    last_query: RwLock<Option<ContentQuery>>,
}

impl StaticContentStore {
    pub fn new(export: ContentExport) -> Self {
        Self {
            data: RwLock::new(export),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let export: ContentExport = serde_json::from_str(json)
            .map_err(|e| CardError::Content(format!("invalid content export: {e}")))?;
        Ok(Self::new(export))
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CardError::Content(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    // Every write is a single insert, replace or remove, so a guard
    // poisoned by a panicking writer still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, ContentExport> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContentExport> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a post by id.
    pub fn upsert(&self, record: ContentRecord) {
        let mut data = self.write();
        match data.posts.iter_mut().find(|p| p.id == record.id) {
            Some(existing) => *existing = record,
            None => data.posts.push(record),
        }
    }

    pub fn remove(&self, id: u64) -> Option<ContentRecord> {
        let mut data = self.write();
        let pos = data.posts.iter().position(|p| p.id == id)?;
        Some(data.posts.remove(pos))
    }

    pub fn add_media(&self, attachment_id: u64, url: impl Into<String>) {
        self.write().media.insert(attachment_id, url.into());
    }

    pub fn add_author(&self, author_id: u64, name: impl Into<String>) {
        self.write().authors.insert(author_id, name.into());
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn image_batch_count(&self) -> usize {
        self.image_batches.load(Ordering::Relaxed)
    }

    pub fn author_batch_count(&self) -> usize {
        self.author_batches.load(Ordering::Relaxed)
    }

    /// The most recent query received.
    pub fn last_query(&self) -> Option<ContentQuery> {
        self.last_query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A filter matches on taxonomy terms, the author id, or a meta value.
fn matches_filter(record: &ContentRecord, key: &str, filter: &FilterValue) -> bool {
    let wanted = filter.values();
    if let Some(slugs) = record.terms.get(key) {
        return slugs.iter().any(|slug| wanted.contains(slug));
    }
    if key == "author" {
        return wanted.iter().any(|w| *w == record.author_id.to_string());
    }
    let meta_text = |value: &Value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };
    match record.meta.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(meta_text)
            .any(|v| wanted.contains(&v)),
        Some(value) => meta_text(value).is_some_and(|v| wanted.contains(&v)),
        None => false,
    }
}

#[async_trait]
impl ContentStore for StaticContentStore {
    fn name(&self) -> &str {
        "static"
    }

    async fn query(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        *self
            .last_query
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(query.clone());

        let data = self.read();
        let mut hits: Vec<ContentRecord> = data
            .posts
            .iter()
            .filter(|p| p.post_type == query.post_type && p.status == query.status)
            .filter(|p| {
                query
                    .filters
                    .iter()
                    .all(|(key, filter)| matches_filter(p, key, filter))
            })
            .cloned()
            .collect();

        match query.order_by {
            OrderBy::Date => hits.sort_by(|a, b| a.published_at.cmp(&b.published_at)),
            OrderBy::Title => hits.sort_by(|a, b| a.title.cmp(&b.title)),
        }
        if query.direction == SortDirection::Desc {
            hits.reverse();
        }
        hits.truncate(query.page_size as usize);
        Ok(hits)
    }

    async fn batch_featured_images(&self, post_ids: &[u64]) -> Result<HashMap<u64, String>> {
        self.image_batches.fetch_add(1, Ordering::Relaxed);
        let data = self.read();
        Ok(data
            .posts
            .iter()
            .filter(|p| post_ids.contains(&p.id))
            .filter_map(|p| {
                let url = data.media.get(&p.thumbnail_id?)?;
                Some((p.id, url.clone()))
            })
            .collect())
    }

    async fn batch_author_names(&self, author_ids: &[u64]) -> Result<HashMap<u64, String>> {
        self.author_batches.fetch_add(1, Ordering::Relaxed);
        let data = self.read();
        Ok(author_ids
            .iter()
            .filter_map(|id| data.authors.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn day(d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn store() -> StaticContentStore {
        let store = StaticContentStore::default();
        store.upsert(ContentRecord::new(1, "post", day(1)).title("old").term("category", "news"));
        store.upsert(ContentRecord::new(2, "post", day(3)).title("new").thumbnail(50));
        store.upsert(ContentRecord::new(3, "post", day(2)).title("draft").status("draft"));
        store.upsert(ContentRecord::new(4, "page", day(4)).title("about"));
        store.add_media(50, "https://site.test/new.jpg");
        store
    }

    #[tokio::test]
    async fn returns_published_newest_first() {
        let hits = store().query(&ContentQuery::new("post", 10)).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn filters_by_term() {
        let query = ContentQuery::parse("post", "category=news", 10).unwrap();
        let hits = store().query(&query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[tokio::test]
    async fn featured_images_by_post_id() {
        let images = store().batch_featured_images(&[1, 2]).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[&2], "https://site.test/new.jpg");
    }

    #[test]
    fn export_json_loads() {
        let store = StaticContentStore::from_json(
            &json!({
                "posts": [{"id": 1, "published_at": "2024-03-05T10:00:00Z"}],
                "authors": {"3": "Jane"}
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(store.data.read().unwrap().authors[&3], "Jane");
        assert!(StaticContentStore::from_json("[]").is_err());
    }

    #[tokio::test]
    async fn keeps_serving_after_a_writer_panics() {
        let store = std::sync::Arc::new(store());
        let writer = std::sync::Arc::clone(&store);
        let outcome = std::thread::spawn(move || {
            let _guard = writer.data.write();
            panic!("writer died");
        })
        .join();
        assert!(outcome.is_err());
        assert!(store.data.is_poisoned());

        store.add_author(9, "Late Author");
        let hits = store.query(&ContentQuery::new("post", 10)).await.unwrap();
        assert!(!hits.is_empty());
        let names = store.batch_author_names(&[9]).await.unwrap();
        assert_eq!(names[&9], "Late Author");
    }
}
