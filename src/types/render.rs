//! Display options in, widget configuration out.

use serde::{Deserialize, Serialize};

use super::card::Card;
use super::mapping::FieldMapping;
use super::source::MAX_PAGE_SIZE;

/// Layout/pagination options. Opaque to the pipeline; passed to the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub layout: String,
    pub columns: u32,
    pub items_per_page: u32,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            layout: "grid".into(),
            columns: 3,
            items_per_page: 12,
        }
    }
}

impl DisplayOptions {
    pub fn layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    pub fn items_per_page(mut self, n: u32) -> Self {
        self.items_per_page = n;
        self
    }

    /// Layout reduced to `[a-z0-9_-]`, columns and page size clamped.
    pub fn sanitized(&self) -> Self {
        let layout: String = self
            .layout
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        Self {
            layout: if layout.is_empty() { "grid".into() } else { layout },
            columns: self.columns.clamp(1, 12),
            items_per_page: self.items_per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

/// Serializable configuration for the client-side card widget.
///
/// Either `source` (a proxied fetch URL) or `data` (inline cards) is set.
/// A failed render still produces a config, with `error` holding a
/// caller-safe message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Card>>,
    pub layout: String,
    pub columns: u32,
    pub items_per_page: u32,
    pub fields: FieldMapping,
    pub wp_data_mode: bool,
    pub demo_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderConfig {
    pub(crate) fn base(display: &DisplayOptions, mapping: &FieldMapping) -> Self {
        let display = display.sanitized();
        Self {
            source: None,
            data: None,
            layout: display.layout,
            columns: display.columns,
            items_per_page: display.items_per_page,
            fields: mapping.resolved(),
            wp_data_mode: false,
            demo_mode: false,
            error: None,
        }
    }

    /// Whether this config carries an error state instead of cards.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_layout_and_bounds() {
        let display = DisplayOptions::default()
            .layout("Masonry<script>")
            .columns(0)
            .items_per_page(1000)
            .sanitized();
        assert_eq!(display.layout, "masonryscript");
        assert_eq!(display.columns, 1);
        assert_eq!(display.items_per_page, MAX_PAGE_SIZE);
    }

    #[test]
    fn empty_layout_falls_back_to_grid() {
        assert_eq!(DisplayOptions::default().layout("!!").sanitized().layout, "grid");
    }

    #[test]
    fn config_serializes_camel_case_without_empty_options() {
        let config = RenderConfig::base(&DisplayOptions::default(), &FieldMapping::default());
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["itemsPerPage"], 12);
        assert_eq!(value["wpDataMode"], false);
        assert!(value.get("source").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["fields"]["title"], "title");
    }
}
