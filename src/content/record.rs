//! CMS-agnostic post record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One published (or not) content item as a [`ContentStore`](super::ContentStore)
/// returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: u64,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub title: String,
    /// Hand-written excerpt; may be empty.
    #[serde(default)]
    pub excerpt: String,
    /// Full body markup, possibly with shortcodes.
    #[serde(default)]
    pub content: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub author_id: u64,
    #[serde(default)]
    pub permalink: String,
    /// Attachment id of the featured image.
    #[serde(default)]
    pub thumbnail_id: Option<u64>,
    /// Structured custom fields (field-plugin data).
    #[serde(default)]
    pub custom_fields: Map<String, Value>,
    /// Raw post meta. Keys starting with `_` are private.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Taxonomy name → term slugs.
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<String>>,
}

fn default_post_type() -> String {
    "post".into()
}

fn default_status() -> String {
    "publish".into()
}

impl ContentRecord {
    /// Minimal published post; the remaining fields start empty.
    pub fn new(id: u64, post_type: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id,
            post_type: post_type.into(),
            status: default_status(),
            title: String::new(),
            excerpt: String::new(),
            content: String::new(),
            published_at,
            author_id: 0,
            permalink: String::new(),
            thumbnail_id: None,
            custom_fields: Map::new(),
            meta: Map::new(),
            terms: BTreeMap::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn author(mut self, author_id: u64) -> Self {
        self.author_id = author_id;
        self
    }

    pub fn permalink(mut self, permalink: impl Into<String>) -> Self {
        self.permalink = permalink.into();
        self
    }

    pub fn thumbnail(mut self, attachment_id: u64) -> Self {
        self.thumbnail_id = Some(attachment_id);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn custom_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn term(mut self, taxonomy: impl Into<String>, slug: impl Into<String>) -> Self {
        self.terms.entry(taxonomy.into()).or_default().push(slug.into());
        self
    }

    pub fn is_published(&self) -> bool {
        self.status == "publish"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_json_fills_defaults() {
        let record: ContentRecord = serde_json::from_value(json!({
            "id": 9,
            "title": "Hello",
            "published_at": "2024-03-05T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(record.post_type, "post");
        assert!(record.is_published());
        assert_eq!(record.thumbnail_id, None);
    }
}
