//! Content fingerprints used as the dedup key.
//!
//! SHA-256 over the image bytes for images, over the UTF-8 text payload for
//! everything else. Different kinds with the same bytes (a text equal to a
//! color's hex string) share a fingerprint.

use crate::interface::ClipboardContent;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest (64 chars)
pub type Fingerprint = String;

/// Compute the dedup key for a content value
pub fn fingerprint(content: &ClipboardContent) -> Fingerprint {
    match content {
        ClipboardContent::Image { data } if !data.is_empty() => hash_bytes(data),
        ClipboardContent::Image { .. }
        | ClipboardContent::Text { .. }
        | ClipboardContent::RichText { .. }
        | ClipboardContent::File { .. }
        | ClipboardContent::Color { .. } => hash_bytes(content.text_payload().as_bytes()),
    }
}

fn hash_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let fp = fingerprint(&ClipboardContent::Text { value: "hello".into() });
        assert_eq!(fp, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }

    #[test]
    fn test_empty_text_hashes_empty_string() {
        let fp = fingerprint(&ClipboardContent::Text { value: String::new() });
        assert_eq!(fp, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_deterministic() {
        let a = ClipboardContent::Image { data: vec![7; 64] };
        let b = ClipboardContent::Image { data: vec![7; 64] };
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&ClipboardContent::Image { data: vec![8; 64] }));
    }

    #[test]
    fn test_image_hashes_blob_same_as_text_of_same_bytes() {
        let image = ClipboardContent::Image { data: b"hello".to_vec() };
        let text = ClipboardContent::Text { value: "hello".into() };
        assert_eq!(fingerprint(&image), fingerprint(&text));
    }

    #[test]
    fn test_cross_kind_collision_is_accepted() {
        let color = ClipboardContent::Color { value: "#FF5733".into() };
        let text = ClipboardContent::Text { value: "#FF5733".into() };
        assert_eq!(fingerprint(&color), fingerprint(&text));
    }

    #[test]
    fn test_rich_text_hashes_plain_rendition() {
        let rich = ClipboardContent::RichText { value: "bold".into(), data: Some(b"{\\rtf1 \\b bold}".to_vec()) };
        let plain = ClipboardContent::Text { value: "bold".into() };
        assert_eq!(fingerprint(&rich), fingerprint(&plain));
    }

    #[test]
    fn test_file_paths_are_order_sensitive() {
        let ab = ClipboardContent::File { paths: vec!["/a".into(), "/b".into()] };
        let ba = ClipboardContent::File { paths: vec!["/b".into(), "/a".into()] };
        assert_ne!(fingerprint(&ab), fingerprint(&ba));
    }
}
