//! Turning arbitrary JSON field values into card strings.

use serde_json::Value;

/// How a field value should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFormat {
    #[default]
    Text,
    Image,
    Url,
    Checkbox,
    Gallery,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `{"url": ...}` / `{"src": ...}` / `{"href": ...}` as used by media and
/// link field plugins.
fn object_url(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    ["url", "src", "href", "source_url"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).and_then(non_empty))
}

/// `{"rendered": ...}` as returned by REST-style CMS APIs.
fn rendered_text(value: &Value) -> Option<String> {
    value
        .as_object()?
        .get("rendered")
        .and_then(Value::as_str)
        .and_then(non_empty)
}

fn join_list(items: &[Value], item: impl Fn(&Value) -> Option<String>) -> Option<String> {
    let parts: Vec<String> = items.iter().filter_map(item).collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Read `value` as `format`. `None` means "nothing usable", never an error.
pub fn format_field_value(value: &Value, format: FieldFormat) -> Option<String> {
    match format {
        FieldFormat::Text => match value {
            Value::Array(items) => join_list(items, scalar_text),
            Value::Object(_) => rendered_text(value),
            other => scalar_text(other),
        },
        FieldFormat::Image => match value {
            Value::String(s) => non_empty(s),
            Value::Object(_) => object_url(value),
            Value::Array(items) => items
                .iter()
                .find_map(|item| format_field_value(item, FieldFormat::Image)),
            // Bare attachment ids need a media lookup; not resolvable here.
            _ => None,
        },
        FieldFormat::Url => match value {
            Value::String(s) => non_empty(s),
            Value::Object(_) => object_url(value).or_else(|| rendered_text(value)),
            _ => None,
        },
        FieldFormat::Checkbox => match value {
            Value::Array(items) => join_list(items, scalar_text),
            Value::Bool(true) => Some("Yes".into()),
            Value::Bool(false) => Some("No".into()),
            other => scalar_text(other),
        },
        FieldFormat::Gallery => match value {
            Value::Array(items) => join_list(items, |item| match item {
                Value::String(s) => non_empty(s),
                other => object_url(other),
            }),
            other => format_field_value(other, FieldFormat::Image),
        },
    }
}
