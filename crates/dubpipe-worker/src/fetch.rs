//! Media fetch orchestration.
//!
//! One job runs `extracting → downloading → placing`. Without dubbing the file
//! is moved to a collision-free name next to `finalPath`; with dubbing it stays
//! in the temp directory and a follow-on job is pushed to the dub queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use dubpipe_media::{
    file_size, find_media_file, move_file, output_file_name, parse_rate_limit,
    remove_dir_best_effort, resolve_output_path, should_forward_log, FetchEventSink,
    FetchProgress, FetchRequest, FetchStatus, MediaFetcher,
};
use dubpipe_models::{JobId, JobStatus, LogLevel, MediaMetadata, MetadataPayload, ProgressPayload};
use dubpipe_queue::{EventPublisher, DubJob, FetchJob, WorkQueue};

use crate::error::{JobFailure, DOWNLOAD_ERROR};
use crate::logging::JobLogger;

/// BullMQ job name used for pushed follow-on jobs.
pub const FOLLOW_ON_JOB_NAME: &str = "default";

/// File name the dubbing stage writes its audio to, inside the temp directory.
pub const DUBBED_AUDIO_FILE: &str = "dubbed.wav";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Used when `finalPath` has no parent directory
    pub media_root: PathBuf,
    pub dub_queue: String,
    pub default_proxy: Option<String>,
    /// Bytes per second
    pub default_rate_limit: Option<u64>,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Moved to its final location
    Placed { path: PathBuf },
    /// Left in the temp directory and handed to the dub queue
    HandedOff { dub_job: DubJob, queue_id: String },
}

pub struct FetchOrchestrator {
    fetcher: Arc<dyn MediaFetcher>,
    publisher: Arc<dyn EventPublisher>,
    queue: Arc<dyn WorkQueue>,
    settings: FetchSettings,
}

impl FetchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        publisher: Arc<dyn EventPublisher>,
        queue: Arc<dyn WorkQueue>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            queue,
            settings,
        }
    }

    /// Run one fetch job to completion.
    ///
    /// On failure exactly one error event and one `DOWNLOADING → FAILED`
    /// state change are published before the failure is returned.
    pub async fn process(&self, job: &FetchJob) -> Result<FetchOutcome, JobFailure> {
        let logger = JobLogger::new(&job.job_id, "fetch");
        let span = logger.create_span();

        async {
            logger.log_start(&job.url);
            self.publisher
                .publish_state_change(&job.job_id, JobStatus::Queued, JobStatus::Downloading)
                .await;

            match self.run(job, &logger).await {
                Ok(outcome) => Ok(outcome),
                Err(failure) => {
                    logger.log_error(&failure.to_string());
                    self.publisher
                        .publish_error(
                            &job.job_id,
                            failure.code,
                            &failure.message,
                            failure.retryable,
                            failure.stack.clone(),
                        )
                        .await;
                    self.publisher
                        .publish_state_change(&job.job_id, JobStatus::Downloading, JobStatus::Failed)
                        .await;
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, job: &FetchJob, logger: &JobLogger) -> Result<FetchOutcome, JobFailure> {
        self.publisher
            .publish_log(&job.job_id, LogLevel::Info, &format!("Starting download: {}", job.url))
            .await;

        tokio::fs::create_dir_all(&job.temp_dir).await.map_err(|e| {
            JobFailure::unexpected(
                &anyhow::Error::new(e)
                    .context(format!("Failed to create temp directory {}", job.temp_dir.display())),
            )
        })?;

        let request = self.request_for(job);

        // extracting
        let metadata = match self.fetcher.extract_info(&request).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                return Err(JobFailure::capability(
                    DOWNLOAD_ERROR,
                    "Failed to extract video info",
                ))
            }
            Err(e) => return Err(JobFailure::from_media(DOWNLOAD_ERROR, &e)),
        };
        logger.log_progress(&format!("Extracted info for '{}'", metadata.source_title));

        // downloading
        let sink = ProgressForwarder {
            publisher: Arc::clone(&self.publisher),
            job_id: job.job_id.clone(),
        };
        self.fetcher
            .download(&request, &sink)
            .await
            .map_err(|e| JobFailure::from_media(DOWNLOAD_ERROR, &e))?;

        // placing
        let ext = job.output_container.extension();
        let produced = find_media_file(&job.temp_dir, &metadata.source_id, ext)
            .await
            .map_err(|e| JobFailure::placement(DOWNLOAD_ERROR, e.to_string()))?
            .ok_or_else(|| JobFailure::placement(DOWNLOAD_ERROR, "Downloaded file not found"))?;

        let source_id = if metadata.source_id.is_empty() {
            job.job_id.as_str()
        } else {
            metadata.source_id.as_str()
        };
        let final_dir = self.final_dir(&job.final_path);

        let outcome = if job.requested_dubbing {
            let dub_job = DubJob {
                job_id: job.job_id.clone(),
                url: job.url.clone(),
                video_path: produced.clone(),
                target_lang: job.target_lang.clone(),
                use_lively_voice: job.use_lively_voice,
                temp_dir: job.temp_dir.clone(),
                output_path: job.temp_dir.join(DUBBED_AUDIO_FILE),
                final_path: final_dir.join(output_file_name(&metadata.source_title, source_id, ext)),
                output_container: job.output_container,
            };
            let queue_id = self.hand_off(&dub_job).await?;
            logger.log_progress(&format!(
                "Enqueued dub job {} on '{}'",
                queue_id, self.settings.dub_queue
            ));

            self.publish_metadata(&job.job_id, &metadata, &produced).await;
            FetchOutcome::HandedOff { dub_job, queue_id }
        } else {
            let dest = resolve_output_path(&metadata.source_title, source_id, ext, &final_dir);
            move_file(&produced, &dest)
                .await
                .map_err(|e| JobFailure::placement(DOWNLOAD_ERROR, e.to_string()))?;
            logger.log_progress(&format!("Moved to {}", dest.display()));

            if !remove_dir_best_effort(&job.temp_dir).await {
                logger.log_warning("Temp directory left behind");
            }

            self.publish_metadata(&job.job_id, &metadata, &dest).await;
            FetchOutcome::Placed { path: dest }
        };

        self.publisher
            .publish_log(
                &job.job_id,
                LogLevel::Info,
                &format!("Download complete: {}", metadata.source_title),
            )
            .await;

        let next = match outcome {
            FetchOutcome::HandedOff { .. } => JobStatus::Downloaded,
            FetchOutcome::Placed { .. } => JobStatus::Complete,
        };
        self.publisher
            .publish_state_change(&job.job_id, JobStatus::Downloading, next)
            .await;

        logger.log_completion(&format!("{} -> {}", JobStatus::Downloading, next));
        Ok(outcome)
    }

    fn request_for(&self, job: &FetchJob) -> FetchRequest {
        FetchRequest {
            url: job.url.clone(),
            output_dir: job.temp_dir.clone(),
            format_preset: job.format_preset.clone(),
            container: job.output_container,
            download_subtitles: job.download_subtitles,
            proxy: job.proxy.clone().or_else(|| self.settings.default_proxy.clone()),
            cookies_file: job.cookies_file.clone(),
            rate_limit: job
                .rate_limit
                .as_deref()
                .and_then(parse_rate_limit)
                .or(self.settings.default_rate_limit),
        }
    }

    fn final_dir(&self, final_path: &Path) -> PathBuf {
        match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => self.settings.media_root.clone(),
        }
    }

    async fn hand_off(&self, dub_job: &DubJob) -> Result<String, JobFailure> {
        let payload = serde_json::to_value(dub_job)
            .map_err(|e| JobFailure::unexpected(&anyhow::Error::new(e)))?;
        self.queue
            .push(&self.settings.dub_queue, &payload, FOLLOW_ON_JOB_NAME)
            .await
            .map_err(|e| {
                JobFailure::capability(DOWNLOAD_ERROR, format!("Failed to enqueue dub job: {}", e))
            })
    }

    async fn publish_metadata(&self, job_id: &JobId, metadata: &MediaMetadata, file: &Path) {
        let payload = MetadataPayload::from(metadata)
            .with_file(file_size(file).await, file.to_string_lossy());
        self.publisher.publish_metadata(job_id, payload).await;
    }
}

/// Turns capability callbacks into progress and log events.
struct ProgressForwarder {
    publisher: Arc<dyn EventPublisher>,
    job_id: JobId,
}

#[async_trait]
impl FetchEventSink for ProgressForwarder {
    async fn on_progress(&self, progress: FetchProgress) {
        match progress.status {
            FetchStatus::Downloading => {
                let payload = ProgressPayload {
                    stage: "downloading".to_string(),
                    percent: progress.percent(),
                    downloaded_bytes: Some(progress.downloaded_bytes.unwrap_or(0)),
                    total_bytes: progress.total(),
                    speed: progress.speed,
                    eta: progress.eta,
                };
                self.publisher.publish_progress(&self.job_id, payload).await;
            }
            FetchStatus::Finished => {
                self.publisher
                    .publish_progress(&self.job_id, ProgressPayload::stage("downloading", 100.0))
                    .await;
            }
            FetchStatus::Error => {
                let message = progress.error.as_deref().unwrap_or("Unknown");
                self.publisher
                    .publish_log(
                        &self.job_id,
                        LogLevel::Error,
                        &format!("Download error: {}", message),
                    )
                    .await;
            }
        }
    }

    async fn on_log(&self, level: LogLevel, line: &str) {
        if should_forward_log(level, line) {
            self.publisher.publish_log(&self.job_id, level, line).await;
        }
    }
}
