//! Broadcast event types.
//!
//! Every event is published on a fixed per-type channel shared by all jobs;
//! subscribers filter on `jobId`. The wire envelope is
//! `{jobId, type, timestamp, payload}`.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus, MediaMetadata};

pub const PROGRESS_CHANNEL: &str = "events:progress";
pub const STATE_CHANNEL: &str = "events:state";
pub const LOG_CHANNEL: &str = "events:log";
pub const ERROR_CHANNEL: &str = "events:error";
pub const METADATA_CHANNEL: &str = "events:metadata";

/// Event types, one channel each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Progress,
    StateChange,
    Log,
    Error,
    Metadata,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Progress => "progress",
            EventType::StateChange => "state_change",
            EventType::Log => "log",
            EventType::Error => "error",
            EventType::Metadata => "metadata",
        }
    }

    /// Channel this event type is broadcast on.
    pub fn channel(&self) -> &'static str {
        match self {
            EventType::Progress => PROGRESS_CHANNEL,
            EventType::StateChange => STATE_CHANNEL,
            EventType::Log => LOG_CHANNEL,
            EventType::Error => ERROR_CHANNEL,
            EventType::Metadata => METADATA_CHANNEL,
        }
    }
}

/// Severity of a forwarded log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    /// Stage label (`downloading`, `mixing`, `muxing`)
    pub stage: String,
    /// 0-100, two decimals at most
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Bytes per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Seconds remaining
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
}

impl ProgressPayload {
    /// Coarse progress with no byte counters.
    pub fn stage(stage: impl Into<String>, percent: f64) -> Self {
        Self {
            stage: stage.into(),
            percent,
            downloaded_bytes: None,
            total_bytes: None,
            speed: None,
            eta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StateChangePayload {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogPayload {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorPayload {
    /// Machine-readable code, e.g. `DOWNLOAD_ERROR`
    pub code: String,
    pub message: String,
    /// Whether resubmitting the job is sensible. Informational only.
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_thumbnail_url: Option<String>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl MetadataPayload {
    /// Attach the produced file's size and location.
    pub fn with_file(mut self, size_bytes: Option<u64>, path: impl Into<String>) -> Self {
        self.file_size_bytes = size_bytes;
        self.file_path = Some(path.into());
        self
    }
}

impl From<&MediaMetadata> for MetadataPayload {
    fn from(meta: &MediaMetadata) -> Self {
        Self {
            source_id: Some(meta.source_id.clone()),
            source_title: Some(meta.source_title.clone()),
            source_uploader: meta.source_uploader.clone(),
            source_upload_date: meta.source_upload_date.clone(),
            source_description: meta.source_description.clone(),
            source_thumbnail_url: meta.source_thumbnail_url.clone(),
            duration_sec: meta.duration_sec,
            width: meta.width,
            height: meta.height,
            fps: meta.fps,
            video_codec: meta.video_codec.clone(),
            audio_codec: meta.audio_codec.clone(),
            file_size_bytes: None,
            file_path: None,
        }
    }
}

/// Type-tagged event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Progress(ProgressPayload),
    StateChange(StateChangePayload),
    Log(LogPayload),
    Error(ErrorPayload),
    Metadata(MetadataPayload),
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            EventBody::Progress(_) => EventType::Progress,
            EventBody::StateChange(_) => EventType::StateChange,
            EventBody::Log(_) => EventType::Log,
            EventBody::Error(_) => EventType::Error,
            EventBody::Metadata(_) => EventType::Metadata,
        }
    }
}

/// Event envelope as broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventMessage {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    /// ISO-8601 UTC with a `Z` suffix
    pub timestamp: String,
    #[serde(flatten)]
    pub body: EventBody,
}

impl EventMessage {
    /// Stamp a new event with the current time.
    pub fn new(job_id: &JobId, body: EventBody) -> Self {
        Self {
            job_id: job_id.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            body,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }

    /// Channel this event belongs on.
    pub fn channel(&self) -> &'static str {
        self.event_type().channel()
    }
}
