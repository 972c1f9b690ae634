//! Job lifecycle events via Redis Pub/Sub.
//!
//! Publishing is fire-and-forget: a failed publish is logged and counted but
//! never aborts the job that emitted it.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, error};

use dubpipe_models::{
    ErrorPayload, EventBody, EventMessage, JobId, JobStatus, LogLevel, LogPayload,
    MetadataPayload, ProgressPayload, StateChangePayload,
};

/// Broadcast sink for job events.
///
/// Implementors only provide [`EventPublisher::publish`]; the typed helpers
/// build the envelope and pick the channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver one event to `channel`. Must not fail.
    async fn publish(&self, channel: &str, message: &EventMessage);

    async fn emit(&self, job_id: &JobId, body: EventBody) {
        let message = EventMessage::new(job_id, body);
        self.publish(message.channel(), &message).await;
    }

    async fn publish_progress(&self, job_id: &JobId, progress: ProgressPayload) {
        self.emit(job_id, EventBody::Progress(progress)).await;
    }

    /// Publish a status change. Pairs that are not edges of the status graph
    /// are dropped.
    async fn publish_state_change(&self, job_id: &JobId, from: JobStatus, to: JobStatus) {
        if let Err(e) = from.transition_to(to) {
            error!(job_id = %job_id, "Refusing to publish state change: {}", e);
            return;
        }
        self.emit(job_id, EventBody::StateChange(StateChangePayload { from, to }))
            .await;
    }

    async fn publish_log(&self, job_id: &JobId, level: LogLevel, message: &str) {
        self.emit(
            job_id,
            EventBody::Log(LogPayload {
                level,
                message: message.to_string(),
            }),
        )
        .await;
    }

    async fn publish_error(
        &self,
        job_id: &JobId,
        code: &str,
        message: &str,
        retryable: bool,
        stack: Option<String>,
    ) {
        self.emit(
            job_id,
            EventBody::Error(ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
                retryable,
                stack,
            }),
        )
        .await;
    }

    async fn publish_metadata(&self, job_id: &JobId, metadata: MetadataPayload) {
        self.emit(job_id, EventBody::Metadata(metadata)).await;
    }
}

/// Publishes events on the shared Redis broker.
pub struct RedisEventPublisher {
    client: redis::Client,
}

impl RedisEventPublisher {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, channel: &str, message: &EventMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                error!(job_id = %message.job_id, channel = %channel, "Failed to serialize event: {}", e);
                metrics::counter!("dubpipe_events_publish_failures_total", "channel" => channel.to_string())
                    .increment(1);
                return;
            }
        };

        let result = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.publish::<_, _, ()>(channel, payload).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(job_id = %message.job_id, channel = %channel, "Published {} event", message.event_type().as_str());
            }
            Err(e) => {
                error!(job_id = %message.job_id, channel = %channel, "Failed to publish event: {}", e);
                metrics::counter!("dubpipe_events_publish_failures_total", "channel" => channel.to_string())
                    .increment(1);
            }
        }
    }
}
