//! Redis work queue and event broadcast.
//!
//! This crate provides:
//! - Blocking pop of job payloads from a Redis list
//! - BullMQ-compatible push of follow-on jobs
//! - Typed, validated job payloads for each pipeline stage
//! - Job lifecycle events via Redis Pub/Sub

pub mod error;
pub mod events;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use events::{EventPublisher, RedisEventPublisher};
pub use job::{parse_job, peek_job_id, DubJob, FetchJob, MuxJob};
pub use queue::{BullJobRecord, QueueConfig, RedisQueue, RetryPolicy, WorkQueue};
