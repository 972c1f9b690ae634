//! Dubbed audio assembly orchestration.
//!
//! probe → extract original audio → duck-mix with the dub → mux both tracks
//! next to the copied video stream → move into place. Any step failing aborts
//! the job; nothing is retried here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Instrument;

use dubpipe_media::{
    extract_audio_command, mix_command, move_file, mux_command, remove_dir_best_effort,
    FfmpegCommand, Transcoder,
};
use dubpipe_models::{JobStatus, LogLevel, OutputContainer, ProgressPayload};
use dubpipe_queue::{EventPublisher, MuxJob};

use crate::error::{JobFailure, MUXING_ERROR};
use crate::logging::JobLogger;

#[derive(Debug, Clone)]
pub struct MuxSettings {
    pub default_container: OutputContainer,
    pub ducking_level: f64,
    pub normalization_lufs: f64,
}

/// Intermediate files written into the job's temp directory.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxPlan {
    pub original_audio: PathBuf,
    pub mixed_audio: PathBuf,
    pub muxed_output: PathBuf,
    pub ducking_level: f64,
    /// Accepted for compatibility; loudness normalization is not performed
    pub normalization_lufs: f64,
}

impl MuxPlan {
    pub fn new(job: &MuxJob, settings: &MuxSettings) -> Self {
        let container = job.output_container.unwrap_or(settings.default_container);
        Self {
            original_audio: job.temp_dir.join("original_audio.wav"),
            mixed_audio: job.temp_dir.join("mixed_audio.wav"),
            muxed_output: job.temp_dir.join(format!("output.{}", container.extension())),
            ducking_level: job.ducking_level.unwrap_or(settings.ducking_level),
            normalization_lufs: job.normalization_lufs.unwrap_or(settings.normalization_lufs),
        }
    }
}

pub struct MuxOrchestrator {
    transcoder: Arc<dyn Transcoder>,
    publisher: Arc<dyn EventPublisher>,
    settings: MuxSettings,
}

impl MuxOrchestrator {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn EventPublisher>,
        settings: MuxSettings,
    ) -> Self {
        Self {
            transcoder,
            publisher,
            settings,
        }
    }

    /// Run one mux job, returning the deliverable's path.
    ///
    /// On failure exactly one error event and one `MUXING → FAILED` state
    /// change are published before the failure is returned.
    pub async fn process(&self, job: &MuxJob) -> Result<PathBuf, JobFailure> {
        let logger = JobLogger::new(&job.job_id, "mux");
        let span = logger.create_span();

        async {
            logger.log_start(&job.video_path.display().to_string());
            self.publisher
                .publish_state_change(&job.job_id, JobStatus::Dubbed, JobStatus::Muxing)
                .await;

            match self.run(job, &logger).await {
                Ok(path) => {
                    self.publisher
                        .publish_state_change(&job.job_id, JobStatus::Muxing, JobStatus::Complete)
                        .await;
                    self.publisher
                        .publish_log(
                            &job.job_id,
                            LogLevel::Info,
                            &format!("Processing complete: {}", path.display()),
                        )
                        .await;
                    if !remove_dir_best_effort(&job.temp_dir).await {
                        logger.log_warning("Temp directory left behind");
                    }
                    logger.log_completion(&path.display().to_string());
                    Ok(path)
                }
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
                        .publish_state_change(&job.job_id, JobStatus::Muxing, JobStatus::Failed)
                        .await;
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, job: &MuxJob, logger: &JobLogger) -> Result<PathBuf, JobFailure> {
        self.publisher
            .publish_log(&job.job_id, LogLevel::Info, "Starting audio mixing and muxing")
            .await;

        require_file(&job.video_path, "Video file not found")?;
        require_file(&job.audio_dubbed_path, "Dubbed audio file not found")?;

        let streams = self
            .transcoder
            .count_audio_streams(&job.video_path)
            .await
            .map_err(|e| JobFailure::from_media(MUXING_ERROR, &e))?;
        if streams == 0 {
            return Err(JobFailure::fatal(
                MUXING_ERROR,
                format!("Video file has no audio stream: {}", job.video_path.display()),
            ));
        }

        tokio::fs::create_dir_all(&job.temp_dir).await.map_err(|e| {
            JobFailure::unexpected(
                &anyhow::Error::new(e)
                    .context(format!("Failed to create temp directory {}", job.temp_dir.display())),
            )
        })?;

        let plan = MuxPlan::new(job, &self.settings);
        logger.log_progress(&format!(
            "ducking_level={} normalization_lufs={}",
            plan.ducking_level, plan.normalization_lufs
        ));

        self.progress(job, "mixing", 10.0).await;
        self.transcode(&extract_audio_command(&job.video_path, &plan.original_audio))
            .await?;

        self.progress(job, "mixing", 30.0).await;
        self.transcode(&mix_command(
            &plan.original_audio,
            &job.audio_dubbed_path,
            plan.ducking_level,
            &plan.mixed_audio,
        ))
        .await?;

        self.progress(job, "muxing", 60.0).await;
        self.transcode(&mux_command(
            &job.video_path,
            &plan.original_audio,
            &plan.mixed_audio,
            &job.target_lang,
            &plan.muxed_output,
        ))
        .await?;

        self.progress(job, "muxing", 90.0).await;
        move_file(&plan.muxed_output, &job.final_path)
            .await
            .map_err(|e| JobFailure::placement(MUXING_ERROR, e.to_string()))?;

        self.progress(job, "muxing", 100.0).await;
        self.publisher
            .publish_log(&job.job_id, LogLevel::Info, "Muxing complete")
            .await;

        Ok(job.final_path.clone())
    }

    async fn transcode(&self, command: &FfmpegCommand) -> Result<(), JobFailure> {
        self.transcoder
            .run(command)
            .await
            .map_err(|e| JobFailure::from_media(MUXING_ERROR, &e))
    }

    async fn progress(&self, job: &MuxJob, stage: &str, percent: f64) {
        self.publisher
            .publish_progress(&job.job_id, ProgressPayload::stage(stage, percent))
            .await;
    }
}

fn require_file(path: &Path, what: &str) -> Result<(), JobFailure> {
    if path.is_file() {
        Ok(())
    } else {
        Err(JobFailure::placement(
            MUXING_ERROR,
            format!("{}: {}", what, path.display()),
        ))
    }
}
