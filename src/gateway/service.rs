//! The card service: endpoints and render entry point over the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::content::{CacheTtls, WordPressQueryAdapter, validate_post_type};
use crate::fetch::{RefreshReport, RemoteFetchCache, spawn_refresh_task, validate_url};
use crate::invalidation::{CacheInvalidationRegistry, ContentEvent};
use crate::normalize::{NormalizeContext, normalize_value};
use crate::ratelimit::{RateLimiter, RequestContext};
use crate::security::{AntiForgery, PREVIEW_ACTION, PROXY_ACTION};
use crate::store::{KvStore, hashed_key};
use crate::telemetry;
use crate::types::{
    Card, DisplayOptions, FieldMapping, RenderConfig, SourceDescriptor, clamp_page_size,
};
use crate::{CardError, Result};

/// Prefix of native-query cache keys.
pub const WP_QUERY_CACHE_PREFIX: &str = "cardcrafter_wp_query";

/// `action` parameter of proxied fetch URLs.
pub const PROXY_FETCH_ACTION: &str = "cardcrafter_proxy_fetch";

/// Message of the preview endpoint when there is nothing to show.
pub const NO_POSTS_MESSAGE: &str = "No WordPress posts found.";

/// A proxy-fetch call as received by the host application.
#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub url: String,
    /// Anti-forgery token issued for [`PROXY_ACTION`].
    pub token: String,
    pub context: RequestContext,
    /// Privileged callers (site editors) are not rate limited.
    pub privileged: bool,
    /// Normalize the response into cards instead of returning raw JSON.
    pub mapping: Option<FieldMapping>,
}

impl ProxyRequest {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }
}

/// JSON envelope: `{"success": bool, "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyBody {
    pub success: bool,
    pub data: Value,
}

/// Endpoint response: HTTP status plus envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: ProxyBody,
}

impl ProxyResponse {
    fn ok(data: Value) -> Self {
        Self {
            status: 200,
            body: ProxyBody {
                success: true,
                data,
            },
        }
    }

    fn failure(status: u16, message: &str) -> Self {
        Self {
            status,
            body: ProxyBody {
                success: false,
                data: json!({ "message": message }),
            },
        }
    }

    fn from_error(err: &CardError) -> Self {
        let mut response = Self::failure(err.status_code(), err.safe_message());
        if let CardError::RateLimited {
            retry_after: Some(after),
        } = err
        {
            response.body.data["retry_after"] = json!(after.as_secs().max(1));
        }
        response
    }

    pub fn is_success(&self) -> bool {
        self.body.success
    }

    /// Caller-facing message of a failed response.
    pub fn message(&self) -> Option<&str> {
        self.body.data.get("message").and_then(Value::as_str)
    }
}

/// Card pipeline façade. Cheap to share behind an `Arc`.
///
/// Built with [`CardCrafter::builder`](super::CardCrafter::builder).
pub struct CardService {
    pub(super) store: Arc<dyn KvStore>,
    pub(super) fetch: Arc<RemoteFetchCache>,
    pub(super) limiter: RateLimiter,
    pub(super) adapter: WordPressQueryAdapter,
    pub(super) invalidation: CacheInvalidationRegistry,
    pub(super) anti_forgery: Arc<dyn AntiForgery>,
    pub(super) site: SiteConfig,
    pub(super) ttls: CacheTtls,
}

impl CardService {
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn fetcher(&self) -> &Arc<RemoteFetchCache> {
        &self.fetch
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn invalidation(&self) -> &CacheInvalidationRegistry {
        &self.invalidation
    }

    /// Issue an anti-forgery token for `action`.
    pub fn issue_token(&self, action: &str) -> String {
        self.anti_forgery.issue(action)
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// Proxy-fetch endpoint: token check, rate limit, cached fetch.
    pub async fn proxy_fetch(&self, request: ProxyRequest) -> ProxyResponse {
        if !self.anti_forgery.verify(&request.token, PROXY_ACTION) {
            debug!("proxy fetch rejected: bad token");
            return ProxyResponse::from_error(&CardError::Forbidden);
        }

        if !request.privileged {
            let identity = self.limiter.identify(&request.context);
            if let Err(err) = self.limiter.acquire(&identity).await {
                return ProxyResponse::from_error(&err);
            }
        }

        match self.proxy_payload(&request).await {
            Ok(data) => ProxyResponse::ok(data),
            Err(err) => {
                debug!(url = %request.url, error = %err, "proxy fetch failed");
                ProxyResponse::from_error(&err)
            }
        }
    }

    async fn proxy_payload(&self, request: &ProxyRequest) -> Result<Value> {
        let value = self.fetch.fetch_cached(&request.url).await?;
        match &request.mapping {
            None => Ok(value),
            Some(mapping) => {
                let cards = self.normalize_remote(&request.url, &value, mapping)?;
                Ok(serde_json::to_value(cards)?)
            }
        }
    }

    /// Posts preview endpoint: recent posts with debug fields, uncached.
    pub async fn posts_preview(&self, token: &str) -> ProxyResponse {
        if !self.anti_forgery.verify(token, PREVIEW_ACTION) {
            return ProxyResponse::from_error(&CardError::Forbidden);
        }
        match self.adapter.preview_recent_posts().await {
            Ok(cards) if cards.is_empty() => ProxyResponse::failure(404, NO_POSTS_MESSAGE),
            Ok(cards) => match serde_json::to_value(cards) {
                Ok(data) => ProxyResponse::ok(data),
                Err(err) => ProxyResponse::from_error(&err.into()),
            },
            Err(err) => {
                warn!(error = %err, "posts preview failed");
                ProxyResponse::from_error(&err)
            }
        }
    }

    // =========================================================================
    // Render
    // =========================================================================

    /// Render entry point. Never fails: errors become a config whose
    /// `error` holds a caller-safe message.
    pub async fn render(
        &self,
        source: &SourceDescriptor,
        display: &DisplayOptions,
        mapping: &FieldMapping,
    ) -> RenderConfig {
        match self.try_render(source, display, mapping).await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "render failed");
                let mut config = RenderConfig::base(display, mapping);
                config.wp_data_mode = matches!(source, SourceDescriptor::WordPressQuery { .. });
                config.error = Some(err.safe_message().to_string());
                config
            }
        }
    }

    /// Render entry point returning the underlying error.
    ///
    /// Remote sources produce a proxied `source` URL for the widget; native
    /// queries and inline data produce cards in `data`.
    pub async fn try_render(
        &self,
        source: &SourceDescriptor,
        display: &DisplayOptions,
        mapping: &FieldMapping,
    ) -> Result<RenderConfig> {
        let mut config = RenderConfig::base(display, mapping);
        match source {
            SourceDescriptor::RemoteUrl { url } => {
                let (url, demo) = self.resolve_remote_url(url)?;
                self.fetch
                    .config()
                    .policy
                    .check_url(&url)
                    .map_err(CardError::from)?;
                config.source = Some(self.proxy_url(url.as_str()));
                config.demo_mode = demo;
            }
            SourceDescriptor::WordPressQuery {
                post_type,
                query,
                page_size,
            } => {
                config.wp_data_mode = true;
                config.data = Some(
                    self.wordpress_cards(post_type, query, *page_size, mapping)
                        .await?,
                );
            }
            SourceDescriptor::InlineData { records } => {
                config.data = Some(normalize_value(records, mapping, &NormalizeContext::default())?);
            }
        }
        Ok(config)
    }

    /// Resolve any source to cards on the server side.
    ///
    /// Remote sources go through the fetch cache (no rate limit: this is a
    /// trusted, server-initiated call).
    pub async fn fetch_cards(
        &self,
        source: &SourceDescriptor,
        mapping: &FieldMapping,
    ) -> Result<Vec<Card>> {
        match source {
            SourceDescriptor::RemoteUrl { url } => {
                let (url, _) = self.resolve_remote_url(url)?;
                let value = self.fetch.fetch_cached(url.as_str()).await?;
                self.normalize_remote(url.as_str(), &value, mapping)
            }
            SourceDescriptor::WordPressQuery {
                post_type,
                query,
                page_size,
            } => {
                self.wordpress_cards(post_type, query, *page_size, mapping)
                    .await
            }
            SourceDescriptor::InlineData { records } => {
                normalize_value(records, mapping, &NormalizeContext::default())
            }
        }
    }

    fn resolve_remote_url(&self, url: &str) -> Result<(Url, bool)> {
        if url.trim().is_empty() {
            return match &self.site.demo_source {
                Some(demo) => Ok((validate_url(demo)?, true)),
                None => Err(CardError::InvalidUrl("no source URL and no demo source".into())),
            };
        }
        Ok((validate_url(url)?, false))
    }

    fn proxy_url(&self, url: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("action", PROXY_FETCH_ACTION)
            .append_pair("url", url)
            .append_pair("nonce", &self.anti_forgery.issue(PROXY_ACTION))
            .finish();
        let separator = if self.site.proxy_endpoint.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.site.proxy_endpoint)
    }

    fn normalize_remote(&self, url: &str, value: &Value, mapping: &FieldMapping) -> Result<Vec<Card>> {
        let mut context = NormalizeContext::new();
        if let Ok(base) = Url::parse(url) {
            context = context.with_base_url(base);
        }
        normalize_value(value, mapping, &context)
    }

    /// Native query through the render cache.
    ///
    /// The key covers everything that shapes the output. Empty results are
    /// cached briefly; the key is registered against the post type either
    /// way so a mutation evicts it.
    async fn wordpress_cards(
        &self,
        post_type: &str,
        query: &str,
        page_size: u32,
        mapping: &FieldMapping,
    ) -> Result<Vec<Card>> {
        validate_post_type(post_type)?;
        let page_size = clamp_page_size(page_size);
        let key = self.wp_cache_key(post_type, query, page_size, mapping)?;

        if !self.site.debug {
            if let Some(value) = self.store.get(&key).await? {
                match serde_json::from_value::<Vec<Card>>(value) {
                    Ok(cards) => {
                        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "wp_query")
                            .increment(1);
                        debug!(post_type, cache_key = %key, "native query cache hit");
                        return Ok(cards);
                    }
                    Err(err) => warn!(cache_key = %key, error = %err, "discarding unreadable cache entry"),
                }
            }
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "wp_query").increment(1);

        let started = Instant::now();
        let cards = self
            .adapter
            .query_and_normalize(post_type, query, page_size, mapping)
            .await?;
        if self.site.debug {
            info!(
                post_type,
                query,
                count = cards.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "native query (debug, cache bypassed)"
            );
        }

        let ttl = self.ttls.for_result(post_type, cards.len());
        self.store
            .set(&key, serde_json::to_value(&cards)?, Some(ttl))
            .await?;
        self.invalidation.register_dependency(&key, post_type).await?;
        Ok(cards)
    }

    /// Cache key of a native-query render.
    pub fn wp_cache_key(
        &self,
        post_type: &str,
        query: &str,
        page_size: u32,
        mapping: &FieldMapping,
    ) -> Result<String> {
        let mapping = serde_json::to_string(&mapping.resolved())?;
        let page_size = clamp_page_size(page_size).to_string();
        Ok(hashed_key(
            WP_QUERY_CACHE_PREFIX,
            &[
                post_type,
                query.trim(),
                page_size.as_str(),
                mapping.as_str(),
                self.site.site_id.as_str(),
                self.site.locale.as_str(),
            ],
        ))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// One background refresh sweep over the tracked URLs.
    pub async fn refresh_tracked(&self) -> Result<RefreshReport> {
        self.fetch.refresh_tracked().await
    }

    /// Spawn the periodic refresh loop.
    pub fn spawn_refresh_task(&self, every: Duration) -> JoinHandle<()> {
        spawn_refresh_task(Arc::clone(&self.fetch), every)
    }

    /// Content mutation hook. Returns the number of evicted cache keys.
    pub async fn on_content_mutated(&self, event: &ContentEvent) -> Result<usize> {
        self.invalidation.on_content_mutated(event).await
    }

    /// Physically drop expired store entries now.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }
}
