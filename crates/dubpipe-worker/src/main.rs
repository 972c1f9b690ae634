//! Dubbing pipeline worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use dubpipe_media::{
    check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegTranscoder, MediaResult, YtDlpFetcher,
};
use dubpipe_queue::{EventPublisher, RedisEventPublisher, RedisQueue, WorkQueue};
use dubpipe_worker::{
    init_tracing, metrics, redact_redis_url, ExecutorSettings, FetchOrchestrator, FetchSettings,
    JobExecutor, MuxOrchestrator, MuxSettings, WorkerConfig, WorkerRole,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level, config.log_json);

    info!(
        role = config.role.as_str(),
        redis = %redact_redis_url(&config.redis_url),
        queue = config.source_queue(),
        max_retries = config.max_retries,
        retry_backoff_base = config.retry_backoff_base,
        "Starting dubpipe-worker"
    );

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Metrics exporter listening on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let queue = match RedisQueue::new(config.queue_config()) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create queue client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.ping().await {
        error!("Redis is not reachable: {}", e);
        std::process::exit(1);
    }

    let publisher: Arc<dyn EventPublisher> =
        Arc::new(RedisEventPublisher::new(queue.client().clone()));
    let queue: Arc<dyn WorkQueue> = Arc::new(queue);

    for dir in [&config.media_root, &config.download_temp_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Failed to create directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let settings = ExecutorSettings::from_config(&config);

    match config.role {
        WorkerRole::Fetch => {
            require_binaries(&[check_ytdlp]);
            let orchestrator = FetchOrchestrator::new(
                Arc::new(YtDlpFetcher::new()),
                Arc::clone(&publisher),
                Arc::clone(&queue),
                FetchSettings {
                    media_root: config.media_root.clone(),
                    dub_queue: config.dub_queue.clone(),
                    default_proxy: config.proxy.clone(),
                    default_rate_limit: config.rate_limit,
                },
            );
            JobExecutor::new(queue, publisher, Arc::new(orchestrator), settings)
                .run(shutdown_rx)
                .await;
        }
        WorkerRole::Mux => {
            require_binaries(&[check_ffmpeg, check_ffprobe]);
            let orchestrator = MuxOrchestrator::new(
                Arc::new(FfmpegTranscoder::new()),
                Arc::clone(&publisher),
                MuxSettings {
                    default_container: config.default_container,
                    ducking_level: config.ducking_level,
                    normalization_lufs: config.normalization_lufs,
                },
            );
            JobExecutor::new(queue, publisher, Arc::new(orchestrator), settings)
                .run(shutdown_rx)
                .await;
        }
    }

    info!("Worker shutdown complete");
}

/// Exit unless every external tool this role shells out to is on `PATH`.
fn require_binaries(checks: &[fn() -> MediaResult<PathBuf>]) {
    for check in checks {
        match check() {
            Ok(path) => info!("Using {}", path.display()),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
