//! Work queue on Redis lists.
//!
//! Workers pop raw payloads with `BLPOP`. Follow-on jobs are pushed in the
//! layout BullMQ expects (`bull:{queue}:{id}` hash plus an entry in
//! `bull:{queue}:wait`) so a Node consumer can pick them up and schedule its
//! own retries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Retry policy written into every pushed job
    pub retry_policy: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Retry policy advertised to the external consumer.
///
/// Nothing in this crate acts on it; it is metadata for whoever pops the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Base delay for exponential backoff
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    fn to_opts(self) -> serde_json::Value {
        json!({
            "attempts": self.attempts,
            "backoff": {
                "type": "exponential",
                "delay": self.backoff_delay.as_millis() as u64,
            }
        })
    }
}

/// Hash record stored at `bull:{queue}:{id}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BullJobRecord {
    pub id: u64,
    pub name: String,
    /// Serialized job payload
    pub data: String,
    /// Serialized retry options
    pub opts: String,
    /// Enqueue time, epoch milliseconds
    pub timestamp: i64,
}

impl BullJobRecord {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        payload: &serde_json::Value,
        policy: RetryPolicy,
    ) -> QueueResult<Self> {
        Ok(Self {
            id,
            name: name.into(),
            data: serde_json::to_string(payload)?,
            opts: serde_json::to_string(&policy.to_opts())?,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Field/value pairs for `HSET`.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("data", self.data.clone()),
            ("opts", self.opts.clone()),
            ("timestamp", self.timestamp.to_string()),
            ("delay", "0".to_string()),
            ("priority", "0".to_string()),
            ("processedOn", "0".to_string()),
            ("progress", "0".to_string()),
        ]
    }
}

pub fn id_counter_key(queue: &str) -> String {
    format!("bull:{}:id", queue)
}

pub fn job_key(queue: &str, id: u64) -> String {
    format!("bull:{}:{}", queue, id)
}

pub fn wait_list_key(queue: &str) -> String {
    format!("bull:{}:wait", queue)
}

/// Work queue operations used by the consumer loop and the orchestrators.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Block up to `timeout` for the next payload. `None` on timeout.
    async fn pop(&self, queue: &str, timeout: Duration) -> QueueResult<Option<String>>;

    /// Append a job for an external consumer. Returns the assigned id.
    async fn push(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        job_name: &str,
    ) -> QueueResult<String>;
}

/// Redis-backed work queue.
pub struct RedisQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisQueue {
    /// Create a new queue client. Does not connect yet.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Shared client, for components that publish on the same broker.
    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Round-trip a `PING` to confirm the broker is reachable.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn pop(&self, queue: &str, timeout: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(queue)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(result.map(|(_, payload)| {
            debug!(queue = %queue, "Popped job payload");
            payload
        }))
    }

    async fn push(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        job_name: &str,
    ) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Shared counter so concurrent producers never reuse an id
        let id: u64 = redis::cmd("INCR")
            .arg(id_counter_key(queue))
            .query_async(&mut conn)
            .await?;

        let record = BullJobRecord::new(id, job_name, payload, self.config.retry_policy)?;

        let mut hset = redis::cmd("HSET");
        hset.arg(job_key(queue, id));
        for (field, value) in record.fields() {
            hset.arg(field).arg(value);
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .add_command(hset)
            .ignore()
            .cmd("LPUSH")
            .arg(wait_list_key(queue))
            .arg(id.to_string())
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;

        info!(queue = %queue, bull_job_id = id, "Enqueued job");
        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bull_record_fields() {
        let payload = json!({"jobId": "j1", "url": "https://example.com"});
        let record = BullJobRecord::new(7, "default", &payload, RetryPolicy::default()).unwrap();
        let fields = record.fields();

        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(get("id"), "7");
        assert_eq!(get("name"), "default");
        assert_eq!(get("delay"), "0");
        assert_eq!(get("priority"), "0");
        assert_eq!(get("processedOn"), "0");
        assert_eq!(get("progress"), "0");

        let data: serde_json::Value = serde_json::from_str(&get("data")).unwrap();
        assert_eq!(data["jobId"], "j1");

        let opts: serde_json::Value = serde_json::from_str(&get("opts")).unwrap();
        assert_eq!(opts["attempts"], 3);
        assert_eq!(opts["backoff"]["type"], "exponential");
        assert_eq!(opts["backoff"]["delay"], 1000);

        assert!(get("timestamp").parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(id_counter_key("dub"), "bull:dub:id");
        assert_eq!(job_key("dub", 12), "bull:dub:12");
        assert_eq!(wait_list_key("dub"), "bull:dub:wait");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(RedisQueue::new(config).is_err());
    }
}
