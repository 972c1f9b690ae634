//! Worker error types and failure classification.

use std::fmt;

use thiserror::Error;

use dubpipe_media::MediaError;
use dubpipe_queue::QueueError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job payload: {0}")]
    Parse(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Broker unreachable: the consumer loop backs off and retries.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_connectivity())
    }
}

/// Error code published by the fetch stage.
pub const DOWNLOAD_ERROR: &str = "DOWNLOAD_ERROR";
/// Error code published by the mux stage.
pub const MUXING_ERROR: &str = "MUXING_ERROR";
/// Error code for anything neither stage could classify.
pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";

/// Substrings marking a failure as transient.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "connection",
    "temporary",
    "unavailable",
    "rate limit",
    "429",
    "502",
    "503",
];

/// Substrings marking the source itself as inaccessible. Checked before
/// [`TRANSIENT_MARKERS`], so "video unavailable" is never retryable.
pub const PERMANENT_MARKERS: &[&str] = &[
    "video unavailable",
    "video is unavailable",
    "video not available",
    "private video",
    "video is private",
    "video has been removed",
    "not available in your country",
    "blocked in your country",
];

/// Whether resubmitting after this failure message is sensible.
///
/// Informational only: nothing in the worker retries on its own.
pub fn is_retryable_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| msg.contains(m)) {
        return false;
    }
    TRANSIENT_MARKERS.iter().any(|m| msg.contains(m))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The fetch or transcode capability failed
    Capability,
    /// An expected file was missing or could not be placed
    Placement,
    /// Anything else
    Unexpected,
}

/// A job-level failure, published as one error event.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    pub stack: Option<String>,
}

impl JobFailure {
    /// Capability failure, classified by message.
    pub fn capability(code: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::Capability,
            code,
            retryable: is_retryable_message(&message),
            message,
            stack: None,
        }
    }

    /// Capability failure that resubmitting cannot fix.
    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Capability,
            code,
            message: message.into(),
            retryable: false,
            stack: None,
        }
    }

    pub fn placement(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Placement,
            code,
            message: message.into(),
            retryable: false,
            stack: None,
        }
    }

    pub fn unexpected(err: &anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Unexpected,
            code: UNEXPECTED_ERROR,
            message: err.to_string(),
            retryable: false,
            stack: Some(format!("{:?}", err)),
        }
    }

    pub fn from_media(code: &'static str, err: &MediaError) -> Self {
        match err {
            MediaError::FileNotFound(path) => {
                Self::placement(code, format!("File not found: {}", path.display()))
            }
            other => Self::capability(code, other.detail()),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for JobFailure {}
