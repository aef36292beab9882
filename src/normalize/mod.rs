//! Record normalization: arbitrary JSON objects in, [`Card`]s out.
//!
//! Input validation ([`parse_records`]) is separate from normalization.
//! Once a value has been accepted as an array of objects, [`normalize`] is
//! total: it never fails and yields exactly one card per record.
//!
//! Per role, the mapped source field is read and coerced to a string
//! (see [`format_field_value`]). Missing or empty values fall back:
//!
//! | role        | fallback                                                 |
//! |-------------|----------------------------------------------------------|
//! | title       | empty string                                             |
//! | subtitle    | empty string                                             |
//! | description | excerpt of `content` / `excerpt` / `body` / `summary`    |
//! | image       | generated placeholder (also for unresolvable paths)      |
//! | link        | record `permalink`, then context canonical link, then "" |

mod coerce;
mod excerpt;
mod placeholder;

pub use coerce::{FieldFormat, format_field_value};
pub use excerpt::{EXCERPT_WORDS, MORE_MARKER, excerpt, strip_shortcodes, strip_tags, trim_words};
pub use placeholder::{PLACEHOLDER_PREFIX, is_placeholder, placeholder_image};

use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use crate::types::{Card, CardId, FieldMapping, FieldRole, RESERVED_KEYS};
use crate::{CardError, Result};

/// Fields tried, in order, when a record has no mapped description.
const DESCRIPTION_SOURCES: [&str; 4] = ["content", "excerpt", "body", "summary"];

/// A JSON object record as it arrives from a source.
pub type Record = Map<String, Value>;

/// Side information used when resolving fallbacks.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    /// Base for relative image paths (usually the fetched URL).
    pub base_url: Option<Url>,
    /// Canonical links keyed by card id, used when a record has no link.
    pub canonical_links: HashMap<String, String>,
}

impl NormalizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn with_canonical_link(mut self, id: impl Into<String>, link: impl Into<String>) -> Self {
        self.canonical_links.insert(id.into(), link.into());
        self
    }
}

/// Accept a JSON array of objects, rejecting anything else.
pub fn parse_records(value: &Value) -> Result<Vec<Record>> {
    let Some(items) = value.as_array() else {
        return Err(CardError::InvalidJson(format!(
            "expected an array of records, got {}",
            json_kind(value)
        )));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map.clone()),
            other => Err(CardError::InvalidJson(format!(
                "record {} is {}, expected an object",
                i + 1,
                json_kind(other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// [`parse_records`] then [`normalize`].
pub fn normalize_value(
    value: &Value,
    mapping: &FieldMapping,
    context: &NormalizeContext,
) -> Result<Vec<Card>> {
    let records = parse_records(value)?;
    Ok(normalize(&records, mapping, context))
}

/// Map every record to a card. Output order and length follow the input.
pub fn normalize(records: &[Record], mapping: &FieldMapping, context: &NormalizeContext) -> Vec<Card> {
    let consumed = mapping.consumed_fields();
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let id = record_id(record, i + 1);
            let read = |role: FieldRole, format: FieldFormat| {
                record
                    .get(mapping.field(role))
                    .and_then(|v| format_field_value(v, format))
            };

            let title = read(FieldRole::Title, FieldFormat::Text).unwrap_or_default();
            let subtitle = read(FieldRole::Subtitle, FieldFormat::Text).unwrap_or_default();

            let description = read(FieldRole::Description, FieldFormat::Text)
                .or_else(|| {
                    DESCRIPTION_SOURCES.iter().find_map(|key| {
                        record.get(*key).and_then(|v| format_field_value(v, FieldFormat::Text))
                    })
                })
                .map(|text| excerpt(&text))
                .unwrap_or_default();

            let image = read(FieldRole::Image, FieldFormat::Image)
                .and_then(|raw| resolve_image(&raw, context.base_url.as_ref()))
                .unwrap_or_else(|| placeholder_image(&title));

            let link = read(FieldRole::Link, FieldFormat::Url)
                .or_else(|| {
                    record
                        .get("permalink")
                        .and_then(|v| format_field_value(v, FieldFormat::Url))
                })
                .or_else(|| context.canonical_links.get(&id.to_string()).cloned())
                .unwrap_or_default();

            let extra = record
                .iter()
                .filter(|(key, _)| {
                    !consumed.contains(key.as_str()) && !RESERVED_KEYS.contains(&key.as_str())
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            Card {
                id,
                title,
                subtitle,
                description,
                image,
                link,
                extra,
            }
        })
        .collect()
}

fn record_id(record: &Record, position: usize) -> CardId {
    match record.get("id") {
        Some(Value::Number(n)) => {
            if let Some(id) = n.as_i64() {
                CardId::Int(id)
            } else if let Some(id) = n.as_u64() {
                CardId::from(id)
            } else {
                CardId::Text(n.to_string())
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => CardId::Text(s.trim().to_string()),
        _ => CardId::Int(position as i64),
    }
}

/// An image reference the widget can load, or `None`.
///
/// Absolute http(s) URLs and inline `data:image/` URLs are kept. Relative
/// paths are joined onto `base`; without a base they are unresolvable.
fn resolve_image(raw: &str, base: Option<&Url>) -> Option<String> {
    if raw.starts_with("data:image/") {
        return Some(raw.to_string());
    }
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
