//! Builder for configuring card service instances

use std::sync::Arc;
use std::time::Duration;

use super::CardService;
use crate::config::{Config, SiteConfig};
use crate::content::{
    CacheTtls, ContentStore, FieldProvider, StaticContentStore, WordPressQueryAdapter,
};
use crate::fetch::{FetchConfig, RemoteFetchCache};
use crate::invalidation::{CLEANUP_INTERVAL, CacheInvalidationRegistry};
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::security::{AntiForgery, SharedSecret};
use crate::store::{KvStore, MemoryStore};
use crate::{CardError, Result};

/// Main entry point for creating card service instances.
pub struct CardCrafter;

impl CardCrafter {
    /// Create a new builder for configuring the service.
    pub fn builder() -> CardCrafterBuilder {
        CardCrafterBuilder::new()
    }
}

/// Builder for configuring card service instances.
///
/// Only the anti-forgery secret is required. The store defaults to an
/// in-memory [`MemoryStore`], the content store to an empty
/// [`StaticContentStore`].
///
/// ```rust
/// # use cardcrafter::{CardCrafter, FetchConfig, RateLimitConfig};
/// let service = CardCrafter::builder()
///     .secret("change-me")
///     .fetch_config(FetchConfig::default())
///     .rate_limit(RateLimitConfig::default().max_requests(60))
///     .build()
///     .unwrap();
/// assert_eq!(service.site().site_id, "default");
/// ```
pub struct CardCrafterBuilder {
    store: Option<Arc<dyn KvStore>>,
    content_store: Option<Arc<dyn ContentStore>>,
    field_providers: Option<Vec<Arc<dyn FieldProvider>>>,
    anti_forgery: Option<Arc<dyn AntiForgery>>,
    fetch: FetchConfig,
    rate_limit: RateLimitConfig,
    ttls: CacheTtls,
    site: SiteConfig,
    cleanup_interval: Duration,
}

impl CardCrafterBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            content_store: None,
            field_providers: None,
            anti_forgery: None,
            fetch: FetchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            ttls: CacheTtls::default(),
            site: SiteConfig::default(),
            cleanup_interval: CLEANUP_INTERVAL,
        }
    }

    /// Apply every section of a loaded configuration file.
    pub fn config(mut self, config: &Config) -> Self {
        self.fetch = config.fetch_config();
        self.rate_limit = config.rate_limit_config();
        self.ttls = config.cache_ttls();
        self.site = config.site.clone();
        self
    }

    /// Shared store for caches, counters and indexes.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Native content backend.
    pub fn content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.content_store = Some(store);
        self
    }

    /// Add a custom field provider. Replaces the default provider set on
    /// first use.
    pub fn field_provider(mut self, provider: Arc<dyn FieldProvider>) -> Self {
        self.field_providers
            .get_or_insert_with(Vec::new)
            .push(provider);
        self
    }

    pub fn anti_forgery(mut self, anti_forgery: Arc<dyn AntiForgery>) -> Self {
        self.anti_forgery = Some(anti_forgery);
        self
    }

    /// Use a [`SharedSecret`] token scheme with `secret`.
    pub fn secret(self, secret: impl Into<Vec<u8>>) -> Self {
        self.anti_forgery(Arc::new(SharedSecret::new(secret)))
    }

    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch = config;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn cache_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn site(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    /// Minimum spacing of expired-entry sweeps.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<CardService> {
        let anti_forgery = self.anti_forgery.ok_or_else(|| {
            CardError::Configuration("no anti-forgery secret configured".to_string())
        })?;

        let store: Arc<dyn KvStore> = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let content_store: Arc<dyn ContentStore> = self
            .content_store
            .unwrap_or_else(|| Arc::new(StaticContentStore::default()));

        let mut adapter = WordPressQueryAdapter::new(content_store);
        if let Some(providers) = self.field_providers {
            adapter = adapter.with_providers(providers);
        }

        Ok(CardService {
            fetch: Arc::new(RemoteFetchCache::new(Arc::clone(&store), self.fetch)?),
            limiter: RateLimiter::new(Arc::clone(&store), self.rate_limit),
            adapter,
            invalidation: CacheInvalidationRegistry::new(Arc::clone(&store))
                .cleanup_interval(self.cleanup_interval),
            anti_forgery,
            site: self.site,
            ttls: self.ttls,
            store,
        })
    }
}

impl Default for CardCrafterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_secret() {
        assert!(matches!(
            CardCrafter::builder().build(),
            Err(CardError::Configuration(_))
        ));
    }

    #[test]
    fn config_sections_apply() {
        let config: Config = toml::from_str(
            r#"
            [site]
            site_id = "shop"

            [rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();
        let service = CardCrafter::builder()
            .config(&config)
            .secret("k")
            .build()
            .unwrap();
        assert_eq!(service.site().site_id, "shop");
        assert_eq!(service.rate_limiter().config().max_requests, 5);
    }
}
