//! Dubbing pipeline workers.
//!
//! This crate provides:
//! - Media fetch orchestration with hand-off to the dub queue
//! - Dubbed audio assembly (mix and mux)
//! - The consumer loop driving either stage
//! - Failure classification and structured logging

pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod mux;

pub use config::{redact_redis_url, WorkerConfig, WorkerRole};
pub use error::{
    is_retryable_message, FailureKind, JobFailure, WorkerError, WorkerResult, DOWNLOAD_ERROR,
    MUXING_ERROR, UNEXPECTED_ERROR,
};
pub use executor::{ExecutorSettings, JobExecutor, JobHandler, PollOutcome};
pub use fetch::{FetchOrchestrator, FetchOutcome, FetchSettings};
pub use logging::{init_tracing, JobLogger};
pub use mux::{MuxOrchestrator, MuxPlan, MuxSettings};
