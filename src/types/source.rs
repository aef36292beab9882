//! Where a render gets its records from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of posts for a native content query.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Upper bound for page sizes and items per page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Source descriptor for a single render. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// Remote JSON fetched through the proxy. An empty URL selects the
    /// configured demo source.
    RemoteUrl { url: String },
    /// Native CMS content.
    #[serde(rename = "wordpress_query")]
    WordPressQuery {
        post_type: String,
        /// Extra filters as a query string, e.g. `category_name=news&tag[]=rust`.
        #[serde(default)]
        query: String,
        #[serde(default = "default_page_size")]
        page_size: u32,
    },
    /// Records supplied directly by the caller.
    InlineData { records: Value },
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl SourceDescriptor {
    pub fn remote(url: impl Into<String>) -> Self {
        SourceDescriptor::RemoteUrl { url: url.into() }
    }

    pub fn wordpress(post_type: impl Into<String>) -> Self {
        SourceDescriptor::WordPressQuery {
            post_type: post_type.into(),
            query: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn inline(records: Value) -> Self {
        SourceDescriptor::InlineData { records }
    }

    /// Set the extra query string (native queries only).
    pub fn with_query(mut self, extra: impl Into<String>) -> Self {
        if let SourceDescriptor::WordPressQuery { query, .. } = &mut self {
            *query = extra.into();
        }
        self
    }

    /// Set the page size (native queries only).
    pub fn with_page_size(mut self, size: u32) -> Self {
        if let SourceDescriptor::WordPressQuery { page_size, .. } = &mut self {
            *page_size = size;
        }
        self
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(size: u32) -> u32 {
    size.clamp(1, MAX_PAGE_SIZE)
}
