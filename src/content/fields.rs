//! Custom field providers.
//!
//! Each provider contributes extra card fields for a record. Providers run
//! in registration order; a key already present is never overwritten, so
//! earlier providers win.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::ContentRecord;
use crate::normalize::{FieldFormat, format_field_value};

/// Supplies custom fields for a content record.
pub trait FieldProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Fields to merge into the record's card.
    fn fields(&self, record: &ContentRecord) -> Map<String, Value>;
}

/// Structured custom fields (`ContentRecord::custom_fields`).
///
/// Fields registered with a [`FieldFormat`] are flattened to display
/// strings; everything else passes through as-is.
#[derive(Debug, Clone, Default)]
pub struct GenericFieldProvider {
    formats: HashMap<String, FieldFormat>,
}

impl GenericFieldProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare how `field` should be rendered.
    pub fn format(mut self, field: impl Into<String>, format: FieldFormat) -> Self {
        self.formats.insert(field.into(), format);
        self
    }
}

impl FieldProvider for GenericFieldProvider {
    fn name(&self) -> &str {
        "custom_fields"
    }

    fn fields(&self, record: &ContentRecord) -> Map<String, Value> {
        record
            .custom_fields
            .iter()
            .filter_map(|(key, value)| {
                let value = match self.formats.get(key) {
                    Some(format) => Value::String(format_field_value(value, *format)?),
                    None => value.clone(),
                };
                Some((key.clone(), value))
            })
            .collect()
    }
}

/// Public post meta. Private keys (leading `_`) are skipped and
/// single-element arrays are unwrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMetaProvider;

impl FieldProvider for NativeMetaProvider {
    fn name(&self) -> &str {
        "meta"
    }

    fn fields(&self, record: &ContentRecord) -> Map<String, Value> {
        record
            .meta
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .map(|(key, value)| {
                let value = match value {
                    Value::Array(items) if items.len() == 1 => items[0].clone(),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record() -> ContentRecord {
        ContentRecord::new(1, "product", Utc::now())
            .custom_field("price", json!(19.5))
            .custom_field("hero", json!({"url": "https://i.test/hero.png", "id": 4}))
            .custom_field("empty_gallery", json!([]))
            .meta("_edit_lock", json!("123:1"))
            .meta("sku", json!(["ABC-1"]))
    }

    #[test]
    fn generic_provider_formats_declared_fields() {
        let provider = GenericFieldProvider::new()
            .format("hero", FieldFormat::Image)
            .format("empty_gallery", FieldFormat::Gallery);
        let fields = provider.fields(&record());
        assert_eq!(fields["hero"], json!("https://i.test/hero.png"));
        assert_eq!(fields["price"], json!(19.5));
        assert!(!fields.contains_key("empty_gallery"));
    }

    #[test]
    fn meta_provider_hides_private_keys() {
        let fields = NativeMetaProvider.fields(&record());
        assert_eq!(fields["sku"], json!("ABC-1"));
        assert!(!fields.contains_key("_edit_lock"));
    }
}
