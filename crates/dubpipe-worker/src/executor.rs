//! Job consumer loop.
//!
//! One job at a time per process: pop, parse, run the stage's orchestrator,
//! loop. A failing or panicking job never stops the loop; broker outages are
//! waited out with a fixed backoff.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{error, info, warn};
use validator::Validate;

use dubpipe_models::{JobId, JobStatus};
use dubpipe_queue::{parse_job, peek_job_id, EventPublisher, FetchJob, MuxJob, WorkQueue};

use crate::config::WorkerConfig;
use crate::error::{JobFailure, WorkerResult, UNEXPECTED_ERROR};
use crate::fetch::FetchOrchestrator;
use crate::metrics;
use crate::mux::MuxOrchestrator;

/// A pipeline stage the consumer loop can drive.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Job: DeserializeOwned + Validate + Send + Sync + 'static;

    /// Label used in logs and metrics.
    fn stage(&self) -> &'static str;

    /// Status the job is in while this stage runs.
    fn active_status(&self) -> JobStatus;

    fn job_id(job: &Self::Job) -> &JobId;

    /// Run the job. Failure events are already published when this returns `Err`.
    async fn handle(&self, job: &Self::Job) -> Result<(), JobFailure>;
}

#[async_trait]
impl JobHandler for FetchOrchestrator {
    type Job = FetchJob;

    fn stage(&self) -> &'static str {
        "fetch"
    }

    fn active_status(&self) -> JobStatus {
        JobStatus::Downloading
    }

    fn job_id(job: &FetchJob) -> &JobId {
        &job.job_id
    }

    async fn handle(&self, job: &FetchJob) -> Result<(), JobFailure> {
        self.process(job).await.map(|_| ())
    }
}

#[async_trait]
impl JobHandler for MuxOrchestrator {
    type Job = MuxJob;

    fn stage(&self) -> &'static str {
        "mux"
    }

    fn active_status(&self) -> JobStatus {
        JobStatus::Muxing
    }

    fn job_id(job: &MuxJob) -> &JobId {
        &job.job_id
    }

    async fn handle(&self, job: &MuxJob) -> Result<(), JobFailure> {
        self.process(job).await.map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub queue_name: String,
    pub pop_timeout: Duration,
    pub connectivity_backoff: Duration,
    pub unexpected_backoff: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            queue_name: config.source_queue().to_string(),
            pop_timeout: config.pop_timeout,
            connectivity_backoff: config.connectivity_backoff,
            unexpected_backoff: config.unexpected_backoff,
        }
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Pop timed out
    Idle,
    Succeeded(JobId),
    Failed(JobId),
    /// Payload did not parse; nothing was published
    Rejected,
    Panicked(JobId),
}

impl PollOutcome {
    fn label(&self) -> &'static str {
        match self {
            PollOutcome::Idle => "idle",
            PollOutcome::Succeeded(_) => "succeeded",
            PollOutcome::Failed(_) => "failed",
            PollOutcome::Rejected => "rejected",
            PollOutcome::Panicked(_) => "panicked",
        }
    }
}

pub struct JobExecutor<H: JobHandler> {
    queue: Arc<dyn WorkQueue>,
    publisher: Arc<dyn EventPublisher>,
    handler: Arc<H>,
    settings: ExecutorSettings,
}

impl<H: JobHandler> JobExecutor<H> {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        publisher: Arc<dyn EventPublisher>,
        handler: Arc<H>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            queue,
            publisher,
            handler,
            settings,
        }
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let stage = self.handler.stage();
        info!(stage, queue = %self.settings.queue_name, "Consumer loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(_) => continue,
                Err(e) if e.is_connectivity() => {
                    warn!(
                        stage,
                        "Queue unreachable, retrying in {:?}: {}",
                        self.settings.connectivity_backoff,
                        e
                    );
                    metrics::record_loop_error(stage, "connectivity");
                    self.settings.connectivity_backoff
                }
                Err(e) => {
                    error!(stage, "Consumer loop error: {}", e);
                    metrics::record_loop_error(stage, "unexpected");
                    self.settings.unexpected_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(stage, "Consumer loop stopped");
    }

    /// Pop and run at most one job.
    ///
    /// Only queue errors are returned; job failures and panics become
    /// outcomes.
    pub async fn poll_once(&self) -> WorkerResult<PollOutcome> {
        let stage = self.handler.stage();

        let payload = match self
            .queue
            .pop(&self.settings.queue_name, self.settings.pop_timeout)
            .await?
        {
            Some(payload) => payload,
            None => return Ok(PollOutcome::Idle),
        };

        let job: H::Job = match parse_job(&payload) {
            Ok(job) => job,
            Err(e) => {
                let job_id = peek_job_id(&payload);
                warn!(stage, job_id = ?job_id.as_ref().map(|id| id.as_str()), "Rejected job payload: {}", e);
                metrics::record_rejected(stage);
                return Ok(PollOutcome::Rejected);
            }
        };

        let job_id = H::job_id(&job).clone();
        info!(stage, job_id = %job_id, "Executing job");

        let started = Instant::now();
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(async move { handler.handle(&job).await });

        let outcome = match task.await {
            Ok(Ok(())) => {
                info!(stage, job_id = %job_id, "Job completed successfully");
                PollOutcome::Succeeded(job_id)
            }
            Ok(Err(failure)) => {
                warn!(stage, job_id = %job_id, retryable = failure.retryable, "Job failed: {}", failure);
                PollOutcome::Failed(job_id)
            }
            Err(join_error) => {
                let message = match join_error.try_into_panic() {
                    Ok(panic) => panic_message(panic.as_ref()),
                    Err(e) => e.to_string(),
                };
                error!(stage, job_id = %job_id, "Job panicked: {}", message);
                self.publisher
                    .publish_error(&job_id, UNEXPECTED_ERROR, &message, false, None)
                    .await;
                self.publisher
                    .publish_state_change(&job_id, self.handler.active_status(), JobStatus::Failed)
                    .await;
                PollOutcome::Panicked(job_id)
            }
        };

        metrics::record_job(stage, outcome.label(), started.elapsed().as_secs_f64());
        Ok(outcome)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "job task panicked");
    }

    #[test]
    fn test_settings_follow_role() {
        let mut config = WorkerConfig::default();
        assert_eq!(ExecutorSettings::from_config(&config).queue_name, "download");
        config.role = crate::config::WorkerRole::Mux;
        assert_eq!(ExecutorSettings::from_config(&config).queue_name, "mux");
    }
}
