//! Row derivation for newly observed clipboard content
//!
//! Everything computed once at insert time lives here: fingerprint, preview,
//! color swatch, and which payload goes in which column.

use crate::fingerprint::{fingerprint, Fingerprint};
use crate::interface::{CapturedContent, ClipboardContent, ContentKind};

/// Max preview length in characters (excluding the trailing ellipsis)
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Internal row representation for an item that is about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub kind: ContentKind,
    pub content: String,
    pub blob: Option<Vec<u8>>,
    pub thumbnail: Option<Vec<u8>>,
    pub preview: String,
    pub fingerprint: Fingerprint,
    pub source_app: Option<String>,
    pub color_rgba: Option<u32>,
}

impl NewItem {
    /// Derive the row for `captured`. Thumbnails are only kept for images.
    pub fn from_content(captured: &CapturedContent, thumbnail: Option<Vec<u8>>) -> Self {
        let content = &captured.content;
        let kind = content.kind();
        let text = content.text_payload();
        let color_rgba = match content {
            ClipboardContent::Color { value } => crate::normalizer::parse_color_to_rgba(value),
            _ => None,
        };
        let thumbnail = match kind {
            ContentKind::Image => thumbnail.filter(|t| !t.is_empty()),
            _ => None,
        };

        Self {
            kind,
            preview: generate_preview(content),
            fingerprint: fingerprint(content),
            blob: content.blob_payload().map(<[u8]>::to_vec),
            content: text,
            thumbnail,
            source_app: captured.source_app.clone(),
            color_rgba,
        }
    }
}

/// Short display string for a content value
pub fn generate_preview(content: &ClipboardContent) -> String {
    match content {
        ClipboardContent::Image { .. } => "Image".to_string(),
        ClipboardContent::File { paths } => file_preview(paths),
        ClipboardContent::Color { value } => value.trim().to_string(),
        ClipboardContent::Text { value } | ClipboardContent::RichText { value, .. } => {
            trimmed_preview(value, PREVIEW_MAX_CHARS)
        }
    }
}

fn file_preview(paths: &[String]) -> String {
    let Some(first) = paths.first() else {
        return String::new();
    };
    let name = last_path_component(first);
    match paths.len() {
        1 => name,
        n => format!("{} and {} more", name, n - 1),
    }
}

fn last_path_component(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return path.to_string();
    }
    std::path::Path::new(trimmed)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(trimmed)
        .to_string()
}

/// Collapse whitespace runs to single spaces, trim, and cut at `max_chars` with "…"
pub fn trimmed_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
