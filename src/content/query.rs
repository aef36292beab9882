//! Content query description and query-string parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::clamp_page_size;
use crate::{CardError, Result};

/// Keys a query string may not set: they belong to the adapter's own
/// selection or to the query plan.
pub const RESERVED_QUERY_KEYS: [&str; 8] = [
    "post_type",
    "post_status",
    "posts_per_page",
    "paged",
    "no_found_rows",
    "cache_results",
    "update_post_meta_cache",
    "update_post_term_cache",
];

const MAX_POST_TYPE_LEN: usize = 20;

/// Execution hints passed to the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Skip counting total matches (no pagination metadata needed).
    pub no_found_rows: bool,
    pub update_meta_cache: bool,
    pub update_term_cache: bool,
    pub cache_results: bool,
}

impl QueryPlan {
    /// The plan every card query runs with.
    pub const CARD_GRID: QueryPlan = QueryPlan {
        no_found_rows: true,
        update_meta_cache: false,
        update_term_cache: false,
        cache_results: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Date,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// One filter value: `a=b` or `a[]=b&a[]=c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> &[String] {
        match self {
            FilterValue::One(v) => std::slice::from_ref(v),
            FilterValue::Many(vs) => vs,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            FilterValue::One(first) => {
                let first = std::mem::take(first);
                *self = FilterValue::Many(vec![first, value]);
            }
            FilterValue::Many(vs) => vs.push(value),
        }
    }
}

/// A native content query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentQuery {
    pub post_type: String,
    /// Always `publish` for card queries.
    pub status: String,
    pub page_size: u32,
    pub order_by: OrderBy,
    pub direction: SortDirection,
    /// Taxonomy/meta filters from the extra query string.
    pub filters: BTreeMap<String, FilterValue>,
    pub plan: QueryPlan,
}

impl ContentQuery {
    /// Published items of `post_type`, newest first, with the card-grid plan.
    pub fn new(post_type: impl Into<String>, page_size: u32) -> Self {
        Self {
            post_type: post_type.into(),
            status: "publish".into(),
            page_size: clamp_page_size(page_size),
            order_by: OrderBy::Date,
            direction: SortDirection::Desc,
            filters: BTreeMap::new(),
            plan: QueryPlan::CARD_GRID,
        }
    }

    /// Build from a post type plus an extra query string.
    pub fn parse(post_type: &str, extra: &str, page_size: u32) -> Result<Self> {
        validate_post_type(post_type)?;
        let parsed = parse_query_string(extra)?;
        let mut query = Self::new(post_type, page_size);
        query.filters = parsed.filters;
        if let Some(order_by) = parsed.order_by {
            query.order_by = order_by;
        }
        if let Some(direction) = parsed.direction {
            query.direction = direction;
        }
        Ok(query)
    }
}

/// Result of [`parse_query_string`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub filters: BTreeMap<String, FilterValue>,
    pub order_by: Option<OrderBy>,
    pub direction: Option<SortDirection>,
}

/// Post type slugs: `[a-z0-9_-]`, at most 20 characters.
pub fn validate_post_type(post_type: &str) -> Result<()> {
    let valid = !post_type.is_empty()
        && post_type.len() <= MAX_POST_TYPE_LEN
        && post_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CardError::Query(format!("invalid post type {post_type:?}")))
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse `a=b&c[]=d&c[]=e` into filters.
///
/// `orderby` (`date` | `title`) and `order` (`asc` | `desc`) adjust sorting.
/// Empty keys, keys outside `[A-Za-z0-9_-]` (a trailing `[]` aside) and
/// [`RESERVED_QUERY_KEYS`] are rejected. A repeated key collects its values.
pub fn parse_query_string(query: &str) -> Result<ParsedQuery> {
    let query = query.trim().trim_start_matches('?');
    let mut parsed = ParsedQuery::default();

    for (raw_key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let (key, is_list) = match raw_key.strip_suffix("[]") {
            Some(stripped) => (stripped, true),
            None => (raw_key.as_ref(), false),
        };
        if key.is_empty() {
            return Err(CardError::Query("empty parameter name".into()));
        }
        if !valid_key(key) {
            return Err(CardError::Query(format!("illegal parameter name {key:?}")));
        }
        if RESERVED_QUERY_KEYS.contains(&key) {
            return Err(CardError::Query(format!("parameter {key:?} cannot be overridden")));
        }

        let value = value.trim().to_string();
        match key {
            "orderby" => {
                parsed.order_by = Some(match value.to_ascii_lowercase().as_str() {
                    "date" => OrderBy::Date,
                    "title" => OrderBy::Title,
                    other => return Err(CardError::Query(format!("unsupported orderby {other:?}"))),
                });
            }
            "order" => {
                parsed.direction = Some(match value.to_ascii_lowercase().as_str() {
                    "asc" => SortDirection::Asc,
                    "desc" => SortDirection::Desc,
                    other => return Err(CardError::Query(format!("unsupported order {other:?}"))),
                });
            }
            _ => match parsed.filters.get_mut(key) {
                Some(existing) => existing.push(value),
                None => {
                    let entry = if is_list {
                        FilterValue::Many(vec![value])
                    } else {
                        FilterValue::One(value)
                    };
                    parsed.filters.insert(key.to_string(), entry);
                }
            },
        }
    }
    Ok(parsed)
}
