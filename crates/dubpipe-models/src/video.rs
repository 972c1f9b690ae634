//! Media metadata models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of the source's descriptive metadata, taken at extraction time.
///
/// Used for output naming and for the metadata event only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaMetadata {
    /// Source-side identifier (e.g. the platform video ID)
    pub source_id: String,
    /// Source title
    pub source_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uploader: Option<String>,
    /// Upload date as reported by the source (usually `YYYYMMDD`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_thumbnail_url: Option<String>,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

impl MediaMetadata {
    /// Create metadata with only the identifying fields set.
    pub fn new(source_id: impl Into<String>, source_title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_title: source_title.into(),
            source_uploader: None,
            source_upload_date: None,
            source_description: None,
            source_thumbnail_url: None,
            duration_sec: None,
            width: None,
            height: None,
            fps: None,
            video_codec: None,
            audio_codec: None,
        }
    }
}

/// Deliverable container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputContainer {
    #[default]
    Mkv,
    Mp4,
    Webm,
}

impl OutputContainer {
    /// File extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputContainer::Mkv => "mkv",
            OutputContainer::Mp4 => "mp4",
            OutputContainer::Webm => "webm",
        }
    }

    /// Parse a container name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mkv" => Some(OutputContainer::Mkv),
            "mp4" => Some(OutputContainer::Mp4),
            "webm" => Some(OutputContainer::Webm),
            _ => None,
        }
    }
}

impl fmt::Display for OutputContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}
