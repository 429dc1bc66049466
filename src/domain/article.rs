//! The article entity and its submission-time validation rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Maximum accepted title length, in bytes.
pub const TITLE_MAX_BYTES: usize = 75;
/// Maximum accepted message length, in bytes. Bounds the rendered page size.
pub const MESSAGE_MAX_BYTES: usize = 1_000_000;

/// One submitted article as recorded in the board index.
///
/// The message body is not kept here; it lives only in the rendered page
/// under `articles/<id>/index.html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    /// Classification of the stored attachment, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaKind>,
}

/// Media classification derived from the extension of the filename the
/// submitter supplied. Matching is case-sensitive: `photo.PNG` classifies
/// as [`MediaKind::Other`] and renders no embed, though the upload is still
/// stored and reachable by direct link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Other,
}

impl MediaKind {
    pub fn from_filename(filename: &str) -> Self {
        match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg" | "png" | "gif") => Self::Image,
            Some("mp4") => Self::Video,
            Some("mp3") => Self::Audio,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

/// Check submission bounds before any storage is touched.
pub fn validate_submission(title: &str, message: &str) -> Result<(), DomainError> {
    if title.is_empty() || title.len() > TITLE_MAX_BYTES {
        return Err(DomainError::validation(format!(
            "title must be between 1 and {TITLE_MAX_BYTES} characters"
        )));
    }
    if message.is_empty() || message.len() > MESSAGE_MAX_BYTES {
        return Err(DomainError::validation(format!(
            "message must be between 1 and {MESSAGE_MAX_BYTES} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_title_at_both_bounds() {
        assert!(validate_submission("a", "hello").is_ok());
        assert!(validate_submission(&"x".repeat(TITLE_MAX_BYTES), "hello").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized_title() {
        assert!(validate_submission("", "hello").is_err());
        assert!(validate_submission(&"x".repeat(TITLE_MAX_BYTES + 1), "hello").is_err());
    }

    #[test]
    fn rejects_empty_and_oversized_message() {
        assert!(validate_submission("title", "").is_err());
        assert!(validate_submission("title", &"m".repeat(MESSAGE_MAX_BYTES + 1)).is_err());
    }

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(MediaKind::from_filename("photo.jpg"), MediaKind::Image);
        assert_eq!(MediaKind::from_filename("photo.jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_filename("photo.png"), MediaKind::Image);
        assert_eq!(MediaKind::from_filename("anim.gif"), MediaKind::Image);
        assert_eq!(MediaKind::from_filename("clip.mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_filename("song.mp3"), MediaKind::Audio);
    }

    #[test]
    fn extension_matching_is_case_sensitive() {
        // Deliberate contract: uppercase extensions are not recognized.
        assert_eq!(MediaKind::from_filename("photo.PNG"), MediaKind::Other);
        assert_eq!(MediaKind::from_filename("clip.MP4"), MediaKind::Other);
    }

    #[test]
    fn unknown_or_missing_extension_is_other() {
        assert_eq!(MediaKind::from_filename("notes.txt"), MediaKind::Other);
        assert_eq!(MediaKind::from_filename("upload"), MediaKind::Other);
    }

    #[test]
    fn media_kind_round_trips_through_the_index_encoding() {
        let encoded = serde_json::to_string(&MediaKind::Image).unwrap();
        assert_eq!(encoded, "\"image\"");
        let decoded: MediaKind = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, MediaKind::Image);
    }
}
