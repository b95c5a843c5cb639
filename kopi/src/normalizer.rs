//! Clipboard snapshot normalization
//!
//! Turns the host's raw representations into one canonical `ClipboardContent`.
//! Precedence: file URLs, then image bytes, then rich text, then plain text
//! (which may be recognized as a color).

use crate::interface::{CapturedContent, ClipboardContent, RawSnapshot, Representation};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// `#RGB`, `#RRGGBB` or `#RRGGBBAA`
static HEX_COLOR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9A-Fa-f]{3}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").unwrap()
});

/// Normalize a raw snapshot. Returns `None` when it carries no usable payload.
pub fn normalize(raw: &RawSnapshot) -> Option<CapturedContent> {
    let content = classify(&raw.representations)?;
    if content.is_empty() {
        return None;
    }
    let source_app = raw
        .source_app
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Some(CapturedContent::new(content, source_app))
}

fn classify(representations: &[Representation]) -> Option<ClipboardContent> {
    let paths: Vec<String> = representations
        .iter()
        .filter_map(|r| match r {
            Representation::FileUrls { urls } => Some(urls),
            _ => None,
        })
        .flatten()
        .filter_map(|u| file_url_to_path(u))
        .collect();
    if !paths.is_empty() {
        return Some(ClipboardContent::File { paths });
    }

    let image = representations.iter().find_map(|r| match r {
        Representation::Image { data } if !data.is_empty() => Some(data),
        _ => None,
    });
    if let Some(data) = image {
        return Some(ClipboardContent::Image { data: data.clone() });
    }

    let plain_text = representations.iter().find_map(|r| match r {
        Representation::PlainText { text } if !text.is_empty() => Some(text),
        _ => None,
    });

    let rich = representations.iter().find_map(|r| match r {
        Representation::RichText { data, plain_text } if !data.is_empty() => Some((data, plain_text)),
        _ => None,
    });
    if let Some((data, rich_plain)) = rich {
        let value = rich_plain
            .as_ref()
            .filter(|t| !t.is_empty())
            .or(plain_text)
            .cloned()
            .unwrap_or_default();
        return Some(ClipboardContent::RichText { value, data: Some(data.clone()) });
    }

    let text = plain_text?;
    if is_hex_color(text) {
        return Some(ClipboardContent::Color { value: text.trim().to_string() });
    }
    Some(ClipboardContent::Text { value: text.clone() })
}

/// Decode a `file://` URL (or accept an absolute path) into a filesystem path
fn file_url_to_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('/') {
        return Some(trimmed.to_string());
    }
    let url = Url::parse(trimmed).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path()
        .ok()
        .and_then(|p| p.to_str().map(str::to_string))
}

/// Check if a string is a hex color value that also parses as a CSS color
pub fn is_hex_color(text: &str) -> bool {
    let trimmed = text.trim();
    HEX_COLOR_REGEX.is_match(trimmed) && csscolorparser::parse(trimmed).is_ok()
}

/// Parse a color string to RGBA u32 (0xRRGGBBAA format)
/// Returns None if the string is not a valid hex color
pub fn parse_color_to_rgba(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if !HEX_COLOR_REGEX.is_match(trimmed) {
        return None;
    }
    let color = csscolorparser::parse(trimmed).ok()?;
    let [r, g, b, a] = color.to_rgba8();
    Some(((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | (a as u32))
}
