//! Generated placeholder images.
//!
//! A placeholder is a 400x300 SVG inlined as a base64 data URL. The visible
//! caption is the first 20 characters of the title; the full title is
//! embedded as the SVG `<title>` and seeds the background tint, so two
//! different titles never share a placeholder.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

const CAPTION_CHARS: usize = 20;

/// Prefix of every generated placeholder.
pub const PLACEHOLDER_PREFIX: &str = "data:image/svg+xml;base64,";

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Light grey with a faint per-title tint.
fn background_for(title: &str) -> String {
    let digest = Sha256::digest(title.as_bytes());
    let tint = |b: u8| 0xd8 + (b % 0x18);
    format!(
        "#{:02x}{:02x}{:02x}",
        tint(digest[0]),
        tint(digest[1]),
        tint(digest[2])
    )
}

/// Deterministic placeholder for a card titled `title`.
pub fn placeholder_image(title: &str) -> String {
    let caption: String = title.chars().take(CAPTION_CHARS).collect();
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300">"#,
            "<title>{full}</title>",
            r#"<rect fill="{bg}" width="400" height="300"/>"#,
            r##"<text fill="#888" font-family="sans-serif" font-size="24" text-anchor="middle" x="200" y="160">{caption}</text>"##,
            "</svg>"
        ),
        full = escape_xml(title),
        bg = background_for(title),
        caption = escape_xml(&caption),
    );
    format!("{PLACEHOLDER_PREFIX}{}", STANDARD.encode(svg))
}

/// Whether `image` was produced by [`placeholder_image`].
pub fn is_placeholder(image: &str) -> bool {
    image.starts_with(PLACEHOLDER_PREFIX)
}
