//! Shared data models for the dubpipe media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job identity and the pipeline status machine
//! - Extracted media metadata and output containers
//! - Broadcast event envelopes and their payloads

pub mod event;
pub mod job;
pub mod video;

// Re-export common types
pub use event::{
    ErrorPayload, EventBody, EventMessage, EventType, LogLevel, LogPayload, MetadataPayload,
    ProgressPayload, StateChangePayload, ERROR_CHANNEL, LOG_CHANNEL, METADATA_CHANNEL,
    PROGRESS_CHANNEL, STATE_CHANNEL,
};
pub use job::{InvalidTransition, JobId, JobStatus, Transition};
pub use video::{MediaMetadata, OutputContainer};
