//! Plain-text excerpts from markup.

use std::sync::LazyLock;

use regex::Regex;

/// Words kept in a generated or bounded description.
pub const EXCERPT_WORDS: usize = 20;

/// Marker appended when text was cut.
pub const MORE_MARKER: &str = "...";

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("static regex")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").expect("static regex"));

// `[gallery ids="1,2"]`, `[/caption]`, `[embed /]`; not `[1]` or `[ ]`.
static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[/?[A-Za-z][\w-]*(?:\s[^\[\]]*)?/?\]").expect("static regex")
});

/// Remove shortcode tags, keeping any enclosed text.
pub fn strip_shortcodes(text: &str) -> String {
    SHORTCODE.replace_all(text, " ").into_owned()
}

/// Remove HTML tags and comments; script/style bodies go with their tags.
pub fn strip_tags(text: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(text, " ");
    TAG.replace_all(&without_code, "").into_owned()
}

/// Keep the first `max_words` whitespace-separated words, appending `more`
/// when anything was dropped. Whitespace runs collapse to single spaces.
pub fn trim_words(text: &str, max_words: usize, more: &str) -> String {
    let mut words = text.split_whitespace();
    let kept: Vec<&str> = words.by_ref().take(max_words).collect();
    let mut out = kept.join(" ");
    if words.next().is_some() {
        out.push_str(more);
    }
    out
}

/// Shortcodes stripped, tags stripped, cut to [`EXCERPT_WORDS`].
pub fn excerpt(text: &str) -> String {
    trim_words(
        &strip_tags(&strip_shortcodes(text)),
        EXCERPT_WORDS,
        MORE_MARKER,
    )
}
