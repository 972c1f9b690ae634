//! Job identity and lifecycle status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
///
/// Opaque and stable across every stage of one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pipeline status attached to state-change events.
///
/// ```text
/// QUEUED → DOWNLOADING → DOWNLOADED → DUBBING → DUBBED → MUXING → COMPLETE
///               │ └──────────► COMPLETE (no dubbing)        │
///               └───────────────────► FAILED ◄──────────────┘
/// (any non-terminal state) → CANCELED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Downloading,
    Downloaded,
    Dubbing,
    Dubbed,
    Muxing,
    Complete,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::Downloaded => "DOWNLOADED",
            JobStatus::Dubbing => "DUBBING",
            JobStatus::Dubbed => "DUBBED",
            JobStatus::Muxing => "MUXING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Whether `self → next` is an edge of the status graph.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if next == Canceled {
            return !self.is_terminal();
        }

        matches!(
            (*self, next),
            (Queued, Downloading)
                | (Downloading, Downloaded)
                | (Downloading, Complete)
                | (Downloading, Failed)
                | (Downloaded, Dubbing)
                | (Dubbing, Dubbed)
                | (Dubbing, Failed)
                | (Dubbed, Muxing)
                | (Muxing, Complete)
                | (Muxing, Failed)
        )
    }

    /// Build a checked transition to `next`.
    pub fn transition_to(self, next: JobStatus) -> Result<Transition, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(Transition {
                from: self,
                to: next,
            })
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `(from, to)` pair known to be an edge of the status graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    from: JobStatus,
    to: JobStatus,
}

impl Transition {
    pub fn from_status(&self) -> JobStatus {
        self.from
    }

    pub fn to_status(&self) -> JobStatus {
        self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}
