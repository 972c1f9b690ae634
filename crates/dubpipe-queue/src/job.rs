//! Job payloads carried on the work queues.
//!
//! Each pipeline stage has its own record. Payloads are never mutated in
//! place: a stage builds a fresh record for the next queue.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use dubpipe_models::{JobId, OutputContainer};

use crate::error::{QueueError, QueueResult};

pub const DEFAULT_FORMAT_PRESET: &str = "bestvideo+bestaudio";
pub const DEFAULT_TARGET_LANG: &str = "ru";

fn default_format_preset() -> String {
    DEFAULT_FORMAT_PRESET.to_string()
}

fn default_target_lang() -> String {
    DEFAULT_TARGET_LANG.to_string()
}

fn validate_job_id(job_id: &JobId) -> Result<(), ValidationError> {
    if job_id.as_str().trim().is_empty() {
        return Err(ValidationError::new("empty_job_id"));
    }
    Ok(())
}

/// Fetch stage work item (`download` queue).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FetchJob {
    #[validate(custom(function = "validate_job_id"))]
    pub job_id: JobId,
    /// Source locator handed to the extraction capability
    #[validate(length(min = 1))]
    pub url: String,
    /// Capability format selector
    #[serde(default = "default_format_preset")]
    pub format_preset: String,
    #[serde(default)]
    pub output_container: OutputContainer,
    /// When true the file is handed to the dub queue instead of being placed
    #[serde(default)]
    pub requested_dubbing: bool,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    #[serde(default)]
    pub use_lively_voice: bool,
    #[serde(default)]
    pub download_subtitles: bool,
    /// Exclusive working directory for this job
    pub temp_dir: PathBuf,
    /// Placement hint: only the parent directory is used
    pub final_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<PathBuf>,
    /// Outbound rate, e.g. `50K`, `1M`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<String>,
}

/// Follow-on work item pushed to the `dub` queue by the fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DubJob {
    pub job_id: JobId,
    /// Original locator, needed by the dubbing stage
    pub url: String,
    /// Downloaded file, still inside the temp directory
    pub video_path: PathBuf,
    pub target_lang: String,
    pub use_lively_voice: bool,
    pub temp_dir: PathBuf,
    /// Where the dubbing stage should write its audio
    pub output_path: PathBuf,
    /// Final-path template for the mux stage
    pub final_path: PathBuf,
    pub output_container: OutputContainer,
}

/// Mux stage work item (`mux` queue).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MuxJob {
    #[validate(custom(function = "validate_job_id"))]
    pub job_id: JobId,
    pub video_path: PathBuf,
    pub audio_dubbed_path: PathBuf,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Falls back to the worker's configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_container: Option<OutputContainer>,
    /// Gain applied to the original track, `0 < level <= 1`
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ducking_level: Option<f64>,
    /// Accepted for compatibility, not applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization_lufs: Option<f64>,
    pub temp_dir: PathBuf,
    pub final_path: PathBuf,
}

/// Deserialize and validate a raw queue payload.
pub fn parse_job<T>(payload: &str) -> QueueResult<T>
where
    T: DeserializeOwned + Validate,
{
    let job: T = serde_json::from_str(payload)
        .map_err(|e| QueueError::invalid_payload(e.to_string()))?;
    job.validate()
        .map_err(|e| QueueError::invalid_payload(e.to_string()))?;
    Ok(job)
}

/// Best-effort extraction of `jobId` from a payload that failed to parse.
pub fn peek_job_id(payload: &str) -> Option<JobId> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("jobId")
        .and_then(|v| v.as_str())
        .map(JobId::from)
}
