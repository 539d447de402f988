//! Photos and videos attached to a case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for a single uploaded file.
pub const MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }

    /// Classify by file extension, case-insensitively. Anything outside the
    /// allowed image and video extensions is `None`.
    pub fn from_file_name(file_name: &str) -> Option<(Self, String)> {
        let (_, ext) = file_name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some((MediaType::Image, ext))
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some((MediaType::Video, ext))
        } else {
            None
        }
    }
}

/// A stored attachment. `storage_key` addresses the blob in the media store
/// and is not exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMedia {
    pub id: Uuid,
    pub case_id: Uuid,
    pub media_type: MediaType,
    pub url: String,
    pub file_name: String,
    pub file_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<Uuid>,
    #[serde(skip)]
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// One file pulled out of an upload request.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}
