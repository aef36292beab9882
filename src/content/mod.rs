//! Native CMS content: records, queries and the store seam.
//!
//! The crate never talks to a CMS database directly. A [`ContentStore`]
//! executes [`ContentQuery`]s and answers the two batch lookups the card
//! pipeline needs; [`WordPressQueryAdapter`] drives it and turns records
//! into cards.

mod adapter;
mod fields;
mod query;
mod record;
mod static_store;

pub use adapter::{
    CacheTtls, DEBUG_IMAGE_URL_FIELD, DEBUG_THUMBNAIL_FIELD, PREVIEW_POST_COUNT,
    WordPressQueryAdapter,
};
pub use fields::{FieldProvider, GenericFieldProvider, NativeMetaProvider};
pub use query::{
    ContentQuery, FilterValue, OrderBy, ParsedQuery, QueryPlan, RESERVED_QUERY_KEYS,
    SortDirection, parse_query_string, validate_post_type,
};
pub use record::ContentRecord;
pub use static_store::{ContentExport, StaticContentStore};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

/// Source of native content records.
///
/// Implementations must honour `query.plan` where their backend has an
/// equivalent, and must answer the batch lookups in a single round trip.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Execute a query. Ordering and `page_size` are the store's job.
    async fn query(&self, query: &ContentQuery) -> Result<Vec<ContentRecord>>;

    /// Featured image URL per post id. Posts without one are absent.
    async fn batch_featured_images(&self, post_ids: &[u64]) -> Result<HashMap<u64, String>> {
        let _ = post_ids;
        Ok(HashMap::new())
    }

    /// Display name per author id. Unknown authors are absent.
    async fn batch_author_names(&self, author_ids: &[u64]) -> Result<HashMap<u64, String>> {
        let _ = author_ids;
        Ok(HashMap::new())
    }
}
