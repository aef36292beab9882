//! Native content queries turned into cards.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ContentQuery, ContentRecord, ContentStore, FieldProvider, GenericFieldProvider};
use crate::normalize::{NormalizeContext, Record, excerpt, normalize};
use crate::types::{Card, FieldMapping};
use crate::Result;

/// Posts shown by the preview endpoint.
pub const PREVIEW_POST_COUNT: u32 = 12;

/// Attachment id of the featured image, on preview cards.
pub const DEBUG_THUMBNAIL_FIELD: &str = "debug_thumbnail_id";

/// Resolved featured image URL (or `false`), on preview cards.
pub const DEBUG_IMAGE_URL_FIELD: &str = "debug_image_url";

/// Subtitle format: "March 5, 2024".
const DATE_FORMAT: &str = "%B %-d, %Y";

/// How long rendered native-query card arrays stay cached.
///
/// Frequently edited types expire sooner. Empty results get their own,
/// shorter TTL so new content shows up quickly.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    pub default_query: Duration,
    pub empty_result: Duration,
    pub by_post_type: HashMap<String, Duration>,
}

impl Default for CacheTtls {
    fn default() -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        Self {
            default_query: minutes(60),
            empty_result: minutes(5),
            by_post_type: HashMap::from([
                ("post".to_string(), minutes(15)),
                ("page".to_string(), minutes(120)),
                ("product".to_string(), minutes(30)),
                ("attachment".to_string(), minutes(240)),
            ]),
        }
    }
}

impl CacheTtls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_query(mut self, ttl: Duration) -> Self {
        self.default_query = ttl;
        self
    }

    pub fn empty_result(mut self, ttl: Duration) -> Self {
        self.empty_result = ttl;
        self
    }

    /// Override the TTL for one post type.
    pub fn post_type(mut self, post_type: impl Into<String>, ttl: Duration) -> Self {
        self.by_post_type.insert(post_type.into(), ttl);
        self
    }

    pub fn for_post_type(&self, post_type: &str) -> Duration {
        self.by_post_type
            .get(post_type)
            .copied()
            .unwrap_or(self.default_query)
    }

    /// TTL for a rendered result of `post_type` holding `len` cards.
    pub fn for_result(&self, post_type: &str, len: usize) -> Duration {
        if len == 0 {
            self.empty_result
        } else {
            self.for_post_type(post_type)
        }
    }
}

/// Runs content queries against a [`ContentStore`] and normalizes the
/// results.
///
/// Every query uses [`QueryPlan::CARD_GRID`](super::QueryPlan::CARD_GRID).
/// After the main query, featured images and author names are loaded with
/// one batch call each, never per post.
#[derive(Clone)]
pub struct WordPressQueryAdapter {
    store: Arc<dyn ContentStore>,
    providers: Vec<Arc<dyn FieldProvider>>,
}

impl WordPressQueryAdapter {
    /// Adapter with the structured custom-field provider installed.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            providers: vec![Arc::new(GenericFieldProvider::new())],
        }
    }

    /// Replace the field providers.
    pub fn with_providers(mut self, providers: Vec<Arc<dyn FieldProvider>>) -> Self {
        self.providers = providers;
        self
    }

    /// Append a field provider; earlier providers win on key clashes.
    pub fn with_provider(mut self, provider: Arc<dyn FieldProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Query `post_type` (+ `extra_query` filters) and normalize the hits.
    ///
    /// An empty result is `Ok(vec![])`, not an error.
    pub async fn query_and_normalize(
        &self,
        post_type: &str,
        extra_query: &str,
        page_size: u32,
        mapping: &FieldMapping,
    ) -> Result<Vec<Card>> {
        let query = ContentQuery::parse(post_type, extra_query, page_size)?;
        let records = self.load(&query, false).await?;
        Ok(normalize(&records, mapping, &NormalizeContext::default()))
    }

    /// The most recent published posts with debug fields attached.
    pub async fn preview_recent_posts(&self) -> Result<Vec<Card>> {
        let query = ContentQuery::new("post", PREVIEW_POST_COUNT);
        let records = self.load(&query, true).await?;
        Ok(normalize(
            &records,
            &FieldMapping::default(),
            &NormalizeContext::default(),
        ))
    }

    async fn load(&self, query: &ContentQuery, debug_fields: bool) -> Result<Vec<Record>> {
        let started = Instant::now();
        let posts = self.store.query(query).await?;
        debug!(
            store = self.store.name(),
            post_type = %query.post_type,
            count = posts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "content query executed"
        );
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<u64> = posts.iter().map(|p| p.id).collect();
        let author_ids: Vec<u64> = posts
            .iter()
            .map(|p| p.author_id)
            .filter(|id| *id != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let images = self.store.batch_featured_images(&post_ids).await?;
        let authors = if author_ids.is_empty() {
            HashMap::new()
        } else {
            self.store.batch_author_names(&author_ids).await?
        };

        Ok(posts
            .iter()
            .map(|post| {
                let mut record = self.card_fields(post, images.get(&post.id), authors.get(&post.author_id));
                if debug_fields {
                    record.insert(DEBUG_THUMBNAIL_FIELD.into(), json!(post.thumbnail_id));
                    record.insert(
                        DEBUG_IMAGE_URL_FIELD.into(),
                        images
                            .get(&post.id)
                            .map_or(Value::Bool(false), |url| Value::String(url.clone())),
                    );
                }
                record
            })
            .collect())
    }

    fn card_fields(&self, post: &ContentRecord, image: Option<&String>, author: Option<&String>) -> Record {
        let description = if post.excerpt.trim().is_empty() {
            excerpt(&post.content)
        } else {
            excerpt(&post.excerpt)
        };

        let mut record = Map::new();
        record.insert("id".into(), json!(post.id));
        record.insert("title".into(), json!(post.title));
        record.insert(
            "subtitle".into(),
            json!(post.published_at.format(DATE_FORMAT).to_string()),
        );
        record.insert("description".into(), json!(description));
        record.insert("link".into(), json!(post.permalink));
        if let Some(url) = image {
            record.insert("image".into(), json!(url));
        }
        record.insert("post_type".into(), json!(post.post_type));
        record.insert(
            "author".into(),
            json!(author.cloned().unwrap_or_default()),
        );

        for provider in &self.providers {
            for (key, value) in provider.fields(post) {
                record.entry(key).or_insert(value);
            }
        }
        record
    }
}
