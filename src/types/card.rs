//! The normalized card record handed to the grid renderer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by [`Card`] itself. Passthrough fields never overwrite these.
pub const RESERVED_KEYS: [&str; 6] = ["id", "title", "subtitle", "description", "image", "link"];

/// Card identifier: whatever the source used, integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardId {
    Int(i64),
    Text(String),
}

impl From<i64> for CardId {
    fn from(id: i64) -> Self {
        CardId::Int(id)
    }
}

impl From<u64> for CardId {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(id) => CardId::Int(id),
            Err(_) => CardId::Text(id.to_string()),
        }
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        CardId::Text(id.to_string())
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardId::Int(id) => write!(f, "{id}"),
            CardId::Text(id) => f.write_str(id),
        }
    }
}

/// A normalized display record.
///
/// `image` is never empty once a card leaves the normalizer: a generated
/// placeholder stands in when the source has nothing renderable. Additional
/// source fields ride along in `extra` and serialize inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    pub image: String,
    #[serde(default)]
    pub link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Card {
    /// Look up a passthrough field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
