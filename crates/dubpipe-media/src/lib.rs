//! Capability adapters for the media pipeline.
//!
//! This crate provides:
//! - Media extraction and download through the yt-dlp CLI
//! - Type-safe FFmpeg command building and an FFprobe stream probe
//! - Ducked mixing and multi-track mux command construction
//! - Filename sanitizing and collision-free output placement

pub mod audio;
pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod naming;
pub mod probe;
pub mod progress;

pub use audio::{
    ducking_filter, extract_audio_command, language_code, mix_command, mux_command,
    FfmpegTranscoder, Transcoder, DEFAULT_DUCKING_LEVEL,
};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{parse_rate_limit, FetchRequest, MediaFetcher, YtDlpFetcher, DEFAULT_FORMAT_PRESET};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{file_size, find_media_file, move_file, remove_dir_best_effort};
pub use naming::{output_file_name, resolve_output_path, sanitize_filename, MAX_TITLE_LEN};
pub use probe::count_audio_streams;
pub use progress::{should_forward_log, FetchEventSink, FetchProgress, FetchStatus};
