//! Redis queue and event integration tests.

use std::time::Duration;

use redis::AsyncCommands;

use dubpipe_models::{JobId, JobStatus, STATE_CHANNEL};
use dubpipe_queue::{EventPublisher, QueueConfig, RedisEventPublisher, RedisQueue, WorkQueue};

fn queue() -> RedisQueue {
    dotenvy::dotenv().ok();
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    RedisQueue::new(QueueConfig {
        redis_url,
        ..Default::default()
    })
    .expect("Failed to create queue")
}

fn unique(name: &str) -> String {
    format!("test-{}-{}", name, JobId::new())
}

/// Test Redis connection.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_connection() {
    queue().ping().await.expect("Redis not reachable");
}

/// Pop returns `None` once the timeout elapses.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_pop_times_out() {
    let queue = queue();
    let name = unique("empty");
    let popped = queue
        .pop(&name, Duration::from_millis(200))
        .await
        .expect("pop failed");
    assert!(popped.is_none());
}

/// Pop sees payloads in the order they were pushed onto the list's tail.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_pop_is_fifo() {
    let queue = queue();
    let name = unique("fifo");
    let mut conn = queue
        .client()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    let _: () = conn.rpush(&name, "first").await.unwrap();
    let _: () = conn.rpush(&name, "second").await.unwrap();

    let timeout = Duration::from_secs(1);
    assert_eq!(queue.pop(&name, timeout).await.unwrap().as_deref(), Some("first"));
    assert_eq!(queue.pop(&name, timeout).await.unwrap().as_deref(), Some("second"));
}

/// Push writes the BullMQ hash and wait-list entry with increasing ids.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_push_bull_layout() {
    let queue = queue();
    let name = unique("dub");
    let payload = serde_json::json!({"jobId": "j1", "videoPath": "/t/a.mkv"});

    let first: u64 = queue.push(&name, &payload, "default").await.unwrap().parse().unwrap();
    let second: u64 = queue.push(&name, &payload, "default").await.unwrap().parse().unwrap();
    assert!(second > first);

    let mut conn = queue
        .client()
        .get_multiplexed_async_connection()
        .await
        .unwrap();

    let wait: Vec<String> = conn
        .lrange(format!("bull:{}:wait", name), 0, -1)
        .await
        .unwrap();
    assert_eq!(wait, vec![second.to_string(), first.to_string()]);

    let data: String = conn
        .hget(format!("bull:{}:{}", name, first), "data")
        .await
        .unwrap();
    let data: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(data["jobId"], "j1");

    let opts: String = conn
        .hget(format!("bull:{}:{}", name, first), "opts")
        .await
        .unwrap();
    assert!(opts.contains("exponential"));

    let _: () = redis::cmd("DEL")
        .arg(format!("bull:{}:id", name))
        .arg(format!("bull:{}:wait", name))
        .arg(format!("bull:{}:{}", name, first))
        .arg(format!("bull:{}:{}", name, second))
        .query_async(&mut conn)
        .await
        .unwrap();
}

/// A subscriber on the state channel receives the envelope.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_state_change_broadcast() {
    let queue = queue();
    let job_id = JobId::from(unique("events").as_str());

    let client = queue.client().clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let subscriber = std::thread::spawn(move || {
        let mut conn = client.get_connection().expect("Failed to connect");
        conn.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut pubsub = conn.as_pubsub();
        pubsub.subscribe(STATE_CHANNEL).unwrap();
        ready_tx.send(()).unwrap();
        pubsub.get_message().unwrap().get_payload::<String>().unwrap()
    });
    ready_rx.recv().unwrap();

    let publisher = RedisEventPublisher::new(queue.client().clone());
    publisher
        .publish_state_change(&job_id, JobStatus::Queued, JobStatus::Downloading)
        .await;

    let payload: serde_json::Value =
        serde_json::from_str(&subscriber.join().unwrap()).unwrap();
    assert_eq!(payload["jobId"], job_id.as_str());
    assert_eq!(payload["type"], "state_change");
    assert_eq!(payload["payload"]["to"], "DOWNLOADING");
}
