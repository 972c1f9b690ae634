//! Media fetch via the yt-dlp CLI.
//!
//! Extraction runs `yt-dlp --dump-single-json --no-download`; download runs
//! with a machine-readable `--progress-template` on stdout so progress can be
//! forwarded while the process runs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use dubpipe_models::{LogLevel, MediaMetadata, OutputContainer};

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::progress::{FetchEventSink, FetchProgress, FetchStatus};

/// Format selector left to the capability's own default.
pub const DEFAULT_FORMAT_PRESET: &str = "bestvideo+bestaudio";

/// Prefer h264/aac for broad container compatibility.
const FORMAT_SORT: &str = "vcodec:h264,lang,quality,res,fps,hdr:12,acodec:aac";

/// Stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 50;

const PROGRESS_PREFIX: &str = "dubpipe-progress:";

const PROGRESS_TEMPLATE: &str = "download:dubpipe-progress:%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

/// Everything the capability needs for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    /// Working directory the produced file is written into
    pub output_dir: PathBuf,
    pub format_preset: String,
    pub container: OutputContainer,
    pub download_subtitles: bool,
    pub proxy: Option<String>,
    pub cookies_file: Option<PathBuf>,
    /// Bytes per second
    pub rate_limit: Option<u64>,
}

/// Media extraction capability.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Metadata-only pass. `Ok(None)` when the source yields nothing.
    async fn extract_info(&self, request: &FetchRequest) -> MediaResult<Option<MediaMetadata>>;

    /// Download into `request.output_dir`, reporting through `sink`.
    async fn download(&self, request: &FetchRequest, sink: &dyn FetchEventSink) -> MediaResult<()>;
}

/// [`MediaFetcher`] backed by the `yt-dlp` binary.
#[derive(Debug, Clone, Default)]
pub struct YtDlpFetcher;

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn extract_info(&self, request: &FetchRequest) -> MediaResult<Option<MediaMetadata>> {
        check_ytdlp()?;

        let cookies = usable_cookies_file(request.cookies_file.as_deref()).await;
        let args = extract_args(request, cookies.as_deref());
        debug!("Running yt-dlp {}", args.join(" "));

        let output = Command::new("yt-dlp")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::extraction_failed(failure_message(
                &stderr,
                output.status.code(),
            )));
        }

        parse_info(&output.stdout)
    }

    async fn download(&self, request: &FetchRequest, sink: &dyn FetchEventSink) -> MediaResult<()> {
        check_ytdlp()?;

        let cookies = usable_cookies_file(request.cookies_file.as_deref()).await;
        let args = download_args(request, cookies.as_deref());
        info!(url = %request.url, output_dir = %request.output_dir.display(), "Downloading with yt-dlp");
        debug!("Running yt-dlp {}", args.join(" "));

        let mut command = Command::new("yt-dlp");
        command.args(&args);
        let (status, stderr_tail) = run_with_sink(command, sink).await?;

        if status.success() {
            return Ok(());
        }

        let stderr_tail: Vec<String> = stderr_tail.into();
        let message = failure_message(&stderr_tail.join("\n"), status.code());
        warn!(url = %request.url, "yt-dlp failed: {}", message);
        sink.on_progress(FetchProgress {
            error: Some(message.clone()),
            ..FetchProgress::new(FetchStatus::Error)
        })
        .await;
        Err(MediaError::download_failed(message))
    }
}

/// Run `command`, feeding its output to `sink` line by line.
///
/// Returns the exit status and the last [`STDERR_TAIL_LINES`] stderr lines.
/// The child is killed if reading its output fails or the future is dropped.
async fn run_with_sink(
    mut command: Command,
    sink: &dyn FetchEventSink,
) -> MediaResult<(ExitStatus, VecDeque<String>)> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::download_failed("yt-dlp stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::download_failed("yt-dlp stderr not captured"))?;

    match pump_output(stdout, stderr, sink).await {
        Ok(tail) => {
            let status = child.wait().await?;
            Ok((status, tail))
        }
        Err(e) => {
            if let Err(kill_err) = child.kill().await {
                warn!("Failed to kill yt-dlp after read error: {}", kill_err);
            }
            Err(e.into())
        }
    }
}

/// Forward every stdout and stderr line to `sink` until both streams close.
async fn pump_output<O, E>(
    stdout: O,
    stderr: E,
    sink: &dyn FetchEventSink,
) -> std::io::Result<VecDeque<String>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout_lines = BufReader::new(stdout).split(b'\n');
    let mut stderr_lines = BufReader::new(stderr).split(b'\n');
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_lines.next_segment(), if stdout_open => match line? {
                Some(bytes) => handle_line(&decode_line(&bytes), sink).await,
                None => stdout_open = false,
            },
            line = stderr_lines.next_segment(), if stderr_open => match line? {
                Some(bytes) => {
                    let line = decode_line(&bytes);
                    handle_line(&line, sink).await;
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line);
                }
                None => stderr_open = false,
            },
        }
    }

    Ok(stderr_tail)
}

/// Titles and paths are not guaranteed to be UTF-8.
fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

async fn handle_line(line: &str, sink: &dyn FetchEventSink) {
    if let Some(progress) = parse_progress_line(line) {
        sink.on_progress(progress).await;
        return;
    }
    let (level, text) = classify_line(line);
    if !text.is_empty() {
        sink.on_log(level, text).await;
    }
}

/// Map a yt-dlp output line to a log level.
fn classify_line(line: &str) -> (LogLevel, &str) {
    let line = line.trim_end();
    if line.starts_with("ERROR:") {
        (LogLevel::Error, line)
    } else if line.starts_with("WARNING:") {
        (LogLevel::Warning, line)
    } else if line.starts_with("[debug]") {
        (LogLevel::Debug, line)
    } else {
        (LogLevel::Info, line)
    }
}

/// Best description of a failed run: the last `ERROR:` line, else the last
/// stderr line, else the exit code.
fn failure_message(stderr: &str, exit_code: Option<i32>) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if let Some(line) = lines.iter().rev().find(|l| l.starts_with("ERROR:")) {
        return line.trim_start_matches("ERROR:").trim().to_string();
    }
    if let Some(line) = lines.last() {
        return line.to_string();
    }
    match exit_code {
        Some(code) => format!("yt-dlp exited with status {}", code),
        None => "yt-dlp terminated by signal".to_string(),
    }
}

fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let fields: Vec<&str> = rest.split('|').collect();
    if fields.len() != 6 {
        return None;
    }

    let num = |s: &str| -> Option<f64> {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    let bytes = |s: &str| num(s).map(|v| v as u64);

    Some(FetchProgress {
        status: FetchStatus::parse(fields[0])?,
        downloaded_bytes: bytes(fields[1]),
        total_bytes: bytes(fields[2]),
        total_bytes_estimate: bytes(fields[3]),
        speed: num(fields[4]),
        eta: bytes(fields[5]),
        error: None,
    })
}

/// Options shared by extraction and download.
fn common_args(request: &FetchRequest, cookies: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = [
        "--retries",
        "10",
        "--fragment-retries",
        "10",
        "--extractor-retries",
        "5",
        "--file-access-retries",
        "3",
        "--socket-timeout",
        "30",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(proxy) = &request.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }
    if let Some(cookies) = cookies {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().to_string());
    }
    args
}

pub fn extract_args(request: &FetchRequest, cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--no-download".to_string(),
    ];
    args.extend(common_args(request, cookies));
    args.push(request.url.clone());
    args
}

pub fn download_args(request: &FetchRequest, cookies: Option<&Path>) -> Vec<String> {
    let template = request.output_dir.join("%(id)s.%(ext)s");
    let mut args = vec![
        "--newline".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        "--merge-output-format".to_string(),
        request.container.extension().to_string(),
        "--format-sort".to_string(),
        FORMAT_SORT.to_string(),
    ];

    if !request.format_preset.is_empty() && request.format_preset != DEFAULT_FORMAT_PRESET {
        args.push("-f".to_string());
        args.push(request.format_preset.clone());
    }

    if request.download_subtitles {
        args.extend(
            ["--write-subs", "--sub-langs", "en,ru,all", "--sub-format", "best"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    if let Some(rate) = request.rate_limit {
        args.push("--limit-rate".to_string());
        args.push(rate.to_string());
    }

    args.extend(common_args(request, cookies));
    args.push(request.url.clone());
    args
}

/// Parse `50K`, `1.5M`, `2G` (binary multiples) or plain bytes per second.
/// Anything else yields `None`.
pub fn parse_rate_limit(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_uppercase();
    if value.is_empty() {
        return None;
    }

    let (number, multiplier) = match value.chars().last() {
        Some('K') => (&value[..value.len() - 1], 1024u64),
        Some('M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => return value.parse::<u64>().ok(),
    };

    let number: f64 = number.trim().parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some((number * multiplier as f64) as u64)
}

/// Whether a cookies file holds at least one non-comment entry.
pub async fn has_cookie_entries(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .any(|l| !l.is_empty() && !l.starts_with('#')),
        Err(_) => false,
    }
}

async fn usable_cookies_file(path: Option<&Path>) -> Option<PathBuf> {
    let path = path?;
    if has_cookie_entries(path).await {
        Some(path.to_path_buf())
    } else {
        debug!("Ignoring cookies file without entries: {}", path.display());
        None
    }
}

/// Subset of yt-dlp's info JSON that feeds [`MediaMetadata`].
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    upload_date: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
}

impl From<YtDlpInfo> for MediaMetadata {
    fn from(info: YtDlpInfo) -> Self {
        Self {
            source_id: info.id.unwrap_or_default(),
            source_title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            source_uploader: info.uploader.or(info.channel),
            source_upload_date: info.upload_date,
            source_description: info.description,
            source_thumbnail_url: info.thumbnail,
            duration_sec: info.duration,
            width: info.width,
            height: info.height,
            fps: info.fps,
            video_codec: info.vcodec,
            audio_codec: info.acodec,
        }
    }
}

fn parse_info(stdout: &[u8]) -> MediaResult<Option<MediaMetadata>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Ok(None);
    }
    let info: YtDlpInfo = serde_json::from_str(text)?;
    Ok(Some(info.into()))
}
