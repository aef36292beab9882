//! CardCrafter - card grids from remote JSON or native CMS content
//!
//! This crate fetches JSON from remote URLs (behind an SSRF guard, a rate
//! limiter and a TTL cache) or queries native content, and normalizes the
//! records into [`Card`]s that a grid widget renders. Cache entries for
//! native queries are indexed by content type so a mutation evicts exactly
//! the renders it affects.
//!
//! # Example
//!
//! ```rust,no_run
//! use cardcrafter::{CardCrafter, DisplayOptions, FieldMapping, SourceDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> cardcrafter::Result<()> {
//!     let service = CardCrafter::builder()
//!         .secret("a long random secret")
//!         .build()?;
//!
//!     let source = SourceDescriptor::remote("https://example.com/team.json");
//!     let mapping = FieldMapping::default().title("name").subtitle("role");
//!     let cards = service.fetch_cards(&source, &mapping).await?;
//!
//!     for card in &cards {
//!         println!("{}: {}", card.title, card.subtitle);
//!     }
//!
//!     let config = service
//!         .render(&source, &DisplayOptions::default(), &mapping)
//!         .await;
//!     println!("{}", serde_json::to_string(&config)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod invalidation;
pub mod normalize;
pub mod ratelimit;
pub mod security;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use config::{Config, Secrets, SiteConfig};
pub use error::{CardError, NetworkErrorKind, Result};
pub use gateway::{CardCrafter, CardCrafterBuilder, CardService, ProxyRequest, ProxyResponse};

pub use content::{
    CacheTtls, ContentQuery, ContentRecord, ContentStore, FieldProvider, StaticContentStore,
    WordPressQueryAdapter,
};
pub use fetch::{FetchConfig, RefreshReport, RemoteFetchCache, TargetPolicy};
pub use invalidation::{CacheInvalidationRegistry, ContentEvent, MutationKind};
pub use normalize::{NormalizeContext, normalize};
pub use ratelimit::{Identity, RateLimitConfig, RateLimiter, RequestContext};
pub use security::{AntiForgery, SharedSecret};
pub use store::{FileStore, KvStore, MemoryStore};

pub use types::{
    Card, CardId, DisplayOptions, FieldMapping, FieldRole, RenderConfig, SourceDescriptor,
};
