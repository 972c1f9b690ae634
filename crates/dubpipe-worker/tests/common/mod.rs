//! In-memory collaborators for exercising the orchestrators and the loop.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use dubpipe_media::{
    FetchEventSink, FetchProgress, FetchRequest, FetchStatus, FfmpegCommand, MediaError,
    MediaFetcher, MediaResult, Transcoder,
};
use dubpipe_models::{
    ErrorPayload, EventBody, EventMessage, EventType, JobStatus, LogLevel, MediaMetadata,
    MetadataPayload, ProgressPayload,
};
use dubpipe_queue::{EventPublisher, QueueError, QueueResult, WorkQueue};

/// Work queue backed by in-process deques.
#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Mutex<Vec<(String, serde_json::Value, String)>>,
    fail_push: bool,
    unreachable: bool,
}

impl MemoryQueue {
    /// Every push fails as if the broker went away.
    pub fn failing_push() -> Self {
        Self {
            fail_push: true,
            ..Default::default()
        }
    }

    /// Every pop fails with a connectivity error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_payload(queue: &str, payload: &str) -> Self {
        let q = Self::default();
        q.enqueue(queue, payload);
        q
    }

    pub fn enqueue(&self, queue: &str, payload: &str) {
        self.lists
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
    }

    pub fn pushed(&self) -> Vec<(String, serde_json::Value, String)> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn remaining(&self, queue: &str) -> usize {
        self.lists
            .lock()
            .unwrap()
            .get(queue)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn pop(&self, queue: &str, timeout: Duration) -> QueueResult<Option<String>> {
        if self.unreachable {
            return Err(QueueError::connection_failed("connection refused"));
        }
        let next = self
            .lists
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(|l| l.pop_front());
        if next.is_none() {
            tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
        }
        Ok(next)
    }

    async fn push(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        job_name: &str,
    ) -> QueueResult<String> {
        if self.fail_push {
            return Err(QueueError::connection_failed("connection refused"));
        }
        let mut pushed = self.pushed.lock().unwrap();
        pushed.push((queue.to_string(), payload.clone(), job_name.to_string()));
        Ok(pushed.len().to_string())
    }
}

/// Publisher that keeps every event in order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, EventMessage)>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, EventMessage)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events()
            .iter()
            .filter(|(_, m)| m.event_type() == event_type)
            .count()
    }

    pub fn transitions(&self) -> Vec<(JobStatus, JobStatus)> {
        self.events()
            .into_iter()
            .filter_map(|(_, m)| match m.body {
                EventBody::StateChange(p) => Some((p.from, p.to)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorPayload> {
        self.events()
            .into_iter()
            .filter_map(|(_, m)| match m.body {
                EventBody::Error(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn metadata(&self) -> Vec<MetadataPayload> {
        self.events()
            .into_iter()
            .filter_map(|(_, m)| match m.body {
                EventBody::Metadata(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<ProgressPayload> {
        self.events()
            .into_iter()
            .filter_map(|(_, m)| match m.body {
                EventBody::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|(_, m)| match m.body {
                EventBody::Log(p) => Some(p.message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, message: &EventMessage) {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), message.clone()));
    }
}

/// Fetch capability that writes `{source_id}.{ext}` into the working directory,
/// plus `{source_id}.en.vtt` when subtitles are requested.
pub struct FakeFetcher {
    pub metadata: Option<MediaMetadata>,
    pub download_error: Option<String>,
    pub panic_on_download: bool,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeFetcher {
    pub fn new(metadata: MediaMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            download_error: None,
            panic_on_download: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn extract_info(&self, request: &FetchRequest) -> MediaResult<Option<MediaMetadata>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.metadata.clone())
    }

    async fn download(&self, request: &FetchRequest, sink: &dyn FetchEventSink) -> MediaResult<()> {
        if self.panic_on_download {
            panic!("fetcher exploded");
        }
        if let Some(message) = &self.download_error {
            let mut progress = FetchProgress::new(FetchStatus::Error);
            progress.error = Some(message.clone());
            sink.on_progress(progress).await;
            return Err(MediaError::download_failed(message.clone()));
        }

        sink.on_log(LogLevel::Info, "[youtube] abc123: Downloading webpage")
            .await;
        sink.on_log(LogLevel::Info, "[download]  50.0% of 10.00MiB at 1.00MiB/s ETA 00:05")
            .await;

        let mut progress = FetchProgress::new(FetchStatus::Downloading);
        progress.downloaded_bytes = Some(512);
        progress.total_bytes = Some(1024);
        sink.on_progress(progress).await;

        let id = self
            .metadata
            .as_ref()
            .map(|m| m.source_id.clone())
            .unwrap_or_default();
        let file = request
            .output_dir
            .join(format!("{}.{}", id, request.container.extension()));
        tokio::fs::write(&file, b"media").await?;
        if request.download_subtitles {
            tokio::fs::write(request.output_dir.join(format!("{}.en.vtt", id)), b"WEBVTT")
                .await?;
        }

        sink.on_progress(FetchProgress::new(FetchStatus::Finished))
            .await;
        Ok(())
    }
}

/// Transcoder that records commands and touches their outputs.
pub struct FakeTranscoder {
    pub audio_streams: usize,
    pub fail_on: Option<&'static str>,
    commands: Mutex<Vec<FfmpegCommand>>,
}

impl FakeTranscoder {
    pub fn new(audio_streams: usize) -> Self {
        Self {
            audio_streams,
            fail_on: None,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<FfmpegCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn count_audio_streams(&self, path: &Path) -> MediaResult<usize> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(self.audio_streams)
    }

    async fn run(&self, command: &FfmpegCommand) -> MediaResult<()> {
        self.commands.lock().unwrap().push(command.clone());
        let args = command.build_args();
        if let Some(marker) = self.fail_on {
            if args.iter().any(|a| a.contains(marker)) {
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with status 1",
                    Some("Invalid data found when processing input".to_string()),
                    Some(1),
                ));
            }
        }
        tokio::fs::write(command.output_path(), b"out").await?;
        Ok(())
    }
}
