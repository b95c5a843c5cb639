//! Kopi FFI Interface Definition
//!
//! This file defines the public interface exposed to the host app via UniFFI.
//! It acts as the source of truth for shared types.

use std::time::SystemTime;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Content category of a clipboard item, persisted in `items.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum ContentKind {
    Text,
    Image,
    File,
    Color,
    RichText,
}

impl ContentKind {
    pub fn to_database_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::File => "file",
            ContentKind::Color => "color",
            ContentKind::RichText => "richText",
        }
    }

    /// Unknown values fall back to `Text` so rows written by newer builds stay readable.
    pub fn from_database_str(s: &str) -> Self {
        match s {
            "image" => ContentKind::Image,
            "file" => ContentKind::File,
            "color" => ContentKind::Color,
            "richText" => ContentKind::RichText,
            _ => ContentKind::Text,
        }
    }
}

/// Type-safe clipboard content representation
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum ClipboardContent {
    Text { value: String },
    /// Plain-text rendition plus the raw rich payload (RTF/HTML) when the host has it
    RichText { value: String, data: Option<Vec<u8>> },
    Image { data: Vec<u8> },
    File { paths: Vec<String> },
    Color { value: String },
}

impl ClipboardContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            ClipboardContent::Text { .. } => ContentKind::Text,
            ClipboardContent::RichText { .. } => ContentKind::RichText,
            ClipboardContent::Image { .. } => ContentKind::Image,
            ClipboardContent::File { .. } => ContentKind::File,
            ClipboardContent::Color { .. } => ContentKind::Color,
        }
    }

    /// Primary textual payload, as stored in `items.content`.
    /// File paths are newline-joined; images have no text.
    pub fn text_payload(&self) -> String {
        match self {
            ClipboardContent::Text { value }
            | ClipboardContent::RichText { value, .. }
            | ClipboardContent::Color { value } => value.clone(),
            ClipboardContent::File { paths } => paths.join("\n"),
            ClipboardContent::Image { .. } => String::new(),
        }
    }

    /// Binary payload, as stored in `items.blob`
    pub fn blob_payload(&self) -> Option<&[u8]> {
        match self {
            ClipboardContent::Image { data } => Some(data.as_slice()),
            ClipboardContent::RichText { data, .. } => data.as_deref(),
            ClipboardContent::Text { .. }
            | ClipboardContent::File { .. }
            | ClipboardContent::Color { .. } => None,
        }
    }

    /// True when neither a text nor a binary payload is present
    pub fn is_empty(&self) -> bool {
        self.text_payload().is_empty() && self.blob_payload().map_or(true, |b| b.is_empty())
    }
}

/// Which tracked query a change feed re-evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum FeedQuery {
    /// Every item, newest first (`list_all`)
    All,
    /// Pinned items only, newest first (`list_pinned`)
    Pinned,
}

/// One declared representation of the OS clipboard, as handed over by the host
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum Representation {
    PlainText { text: String },
    RichText { data: Vec<u8>, plain_text: Option<String> },
    Image { data: Vec<u8> },
    /// `file://` URLs or absolute paths, in pasteboard order
    FileUrls { urls: Vec<String> },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw clipboard snapshot read by the host's clipboard accessor
#[derive(Debug, Clone, PartialEq, Eq, Default, uniffi::Record)]
pub struct RawSnapshot {
    pub representations: Vec<Representation>,
    /// Frontmost/owning application at copy time, if the host could tell
    pub source_app: Option<String>,
    /// Host-generated thumbnail for image payloads
    pub thumbnail: Option<Vec<u8>>,
}

/// Normalized clipboard content, ready to be fingerprinted and stored
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct CapturedContent {
    pub content: ClipboardContent,
    pub source_app: Option<String>,
}

impl CapturedContent {
    pub fn new(content: ClipboardContent, source_app: Option<String>) -> Self {
        Self { content, source_app }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(ClipboardContent::Text { value: value.into() }, None)
    }

    pub fn image(data: Vec<u8>) -> Self {
        Self::new(ClipboardContent::Image { data }, None)
    }

    pub fn kind(&self) -> ContentKind {
        self.content.kind()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A persisted clipboard item
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ClipboardItem {
    pub id: i64,
    pub kind: ContentKind,
    /// Primary textual payload (text, newline-joined file paths, or color value)
    pub content: String,
    pub blob: Option<Vec<u8>>,
    /// Only ever set for image items
    pub thumbnail: Option<Vec<u8>>,
    /// Short display string, computed once at insert
    pub preview: String,
    pub is_pinned: bool,
    pub fingerprint: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub source_app: Option<String>,
    /// 0xRRGGBBAA swatch for color items
    pub color_rgba: Option<u32>,
}

/// Error type for Kopi operations
#[derive(Debug, Error, uniffi::Error)]
pub enum KopiError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// FOREIGN INTERFACES (implemented by the host)
// ═══════════════════════════════════════════════════════════════════════════════

/// The OS clipboard accessor.
///
/// `change_ordinal` must be cheap: it is called on every tick. `read_snapshot`
/// is only called after the ordinal moved.
#[uniffi::export(with_foreign)]
pub trait ClipboardSource: Send + Sync {
    /// Monotonic counter the OS bumps on every clipboard write (e.g. `NSPasteboard.changeCount`)
    fn change_ordinal(&self) -> i64;

    /// Read the current clipboard. `Ok(None)` means nothing readable is on it.
    fn read_snapshot(&self) -> Result<Option<RawSnapshot>, KopiError>;
}

/// Push target for a change feed.
///
/// Called from a background thread, one call at a time per feed, in commit order.
#[uniffi::export(with_foreign)]
pub trait ItemListObserver: Send + Sync {
    fn on_items_changed(&self, items: Vec<ClipboardItem>);
}

impl From<crate::database::DatabaseError> for KopiError {
    fn from(e: crate::database::DatabaseError) -> Self {
        KopiError::Database(e.to_string())
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KopiError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        KopiError::ClipboardUnavailable(e.reason)
    }
}
