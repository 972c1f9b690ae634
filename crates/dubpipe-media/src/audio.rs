//! Dubbed audio assembly: extract, duck-mix, multi-track mux.
//!
//! Ducking is static: the original track is attenuated uniformly for its
//! whole duration, not only while dubbed speech is present.

use std::path::Path;

use async_trait::async_trait;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe;

/// Default gain applied to the original track when mixing.
pub const DEFAULT_DUCKING_LEVEL: f64 = 0.3;

/// Sample rate of the intermediate PCM track.
pub const INTERMEDIATE_SAMPLE_RATE: u32 = 48_000;

/// Bitrate of both AAC tracks in the deliverable.
pub const AUDIO_BITRATE: &str = "192k";

/// Transcoding capability.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn count_audio_streams(&self, path: &Path) -> MediaResult<usize>;

    async fn run(&self, command: &FfmpegCommand) -> MediaResult<()>;
}

/// [`Transcoder`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Default, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn count_audio_streams(&self, path: &Path) -> MediaResult<usize> {
        probe::count_audio_streams(path).await
    }

    async fn run(&self, command: &FfmpegCommand) -> MediaResult<()> {
        self.runner.run(command).await
    }
}

/// Extract the first audio track as stereo 48 kHz 16-bit PCM.
pub fn extract_audio_command(video: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(video)
        .no_video()
        .audio_channels(2)
        .sample_rate(INTERMEDIATE_SAMPLE_RATE)
        .audio_codec("pcm_s16le")
}

/// Filter graph mixing input 0 (original, scaled by `level`) with input 1
/// (dubbed, unity gain), without amix normalization. Output label `[out]`.
pub fn ducking_filter(level: f64) -> String {
    format!(
        "[0:a]volume={}[orig];[1:a]volume=1.0[dub];[orig][dub]amix=inputs=2:duration=longest:normalize=0[out]",
        level
    )
}

pub fn mix_command(original: &Path, dubbed: &Path, level: f64, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(original)
        .input(dubbed)
        .filter_complex(ducking_filter(level))
        .map("[out]")
        .audio_codec("pcm_s16le")
}

/// Copy the video stream and attach the original and dubbed tracks.
///
/// The original track is tagged `und`, titled "Original" and not default.
/// The dubbed track carries the resolved language code, is titled "Dubbed"
/// and is the default track.
pub fn mux_command(
    video: &Path,
    original_audio: &Path,
    mixed_audio: &Path,
    target_lang: &str,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(video)
        .input(original_audio)
        .input(mixed_audio)
        .map("0:v")
        .map("1:a")
        .map("2:a")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .stream_metadata("a:0", "language", "und")
        .stream_metadata("a:0", "title", "Original")
        .disposition("a:0", "0")
        .stream_metadata("a:1", "language", &language_code(target_lang))
        .stream_metadata("a:1", "title", "Dubbed")
        .disposition("a:1", "default")
}

/// ISO 639-3 code for a short language code; unknown codes pass through.
pub fn language_code(lang: &str) -> String {
    match lang {
        "ru" => "rus",
        "en" => "eng",
        "es" => "spa",
        "de" => "deu",
        "fr" => "fra",
        "it" => "ita",
        "pt" => "por",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" => "zho",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.iter()
            .enumerate()
            .filter(|(_, a)| *a == flag)
            .map(|(i, _)| args[i + 1].as_str())
            .collect()
    }

    #[test]
    fn test_ducking_filter_scales_original_only() {
        assert_eq!(
            ducking_filter(0.3),
            "[0:a]volume=0.3[orig];[1:a]volume=1.0[dub];[orig][dub]amix=inputs=2:duration=longest:normalize=0[out]"
        );
        assert!(ducking_filter(1.0).starts_with("[0:a]volume=1[orig]"));
    }

    #[test]
    fn test_extract_command() {
        let args = extract_audio_command(Path::new("/t/v.mkv"), Path::new("/t/original.wav"))
            .build_args();
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(value_after(&args, "-ac"), vec!["2"]);
        assert_eq!(value_after(&args, "-ar"), vec!["48000"]);
        assert_eq!(value_after(&args, "-c:a"), vec!["pcm_s16le"]);
        assert_eq!(args.last().unwrap(), "/t/original.wav");
    }

    #[test]
    fn test_mix_command_inputs() {
        let cmd = mix_command(
            Path::new("/t/original.wav"),
            Path::new("/t/dubbed.wav"),
            0.3,
            Path::new("/t/mixed.wav"),
        );
        assert_eq!(cmd.inputs().len(), 2);
        let args = cmd.build_args();
        assert_eq!(value_after(&args, "-filter_complex"), vec![ducking_filter(0.3).as_str()]);
        assert_eq!(value_after(&args, "-map"), vec!["[out]"]);
    }

    #[test]
    fn test_mux_command_tracks() {
        let args = mux_command(
            Path::new("/t/v.mkv"),
            Path::new("/t/original.wav"),
            Path::new("/t/mixed.wav"),
            "ru",
            Path::new("/t/output.mkv"),
        )
        .build_args();

        assert_eq!(value_after(&args, "-map"), vec!["0:v", "1:a", "2:a"]);
        assert_eq!(value_after(&args, "-c:v"), vec!["copy"]);
        assert_eq!(value_after(&args, "-c:a"), vec!["aac"]);
        assert_eq!(value_after(&args, "-b:a"), vec!["192k"]);
        assert_eq!(value_after(&args, "-metadata:s:a:0"), vec!["language=und", "title=Original"]);
        assert_eq!(value_after(&args, "-metadata:s:a:1"), vec!["language=rus", "title=Dubbed"]);
        assert_eq!(value_after(&args, "-disposition:a:0"), vec!["0"]);
        assert_eq!(value_after(&args, "-disposition:a:1"), vec!["default"]);
    }

    #[test]
    fn test_language_code() {
        assert_eq!(language_code("en"), "eng");
        assert_eq!(language_code("zh"), "zho");
        assert_eq!(language_code("uk"), "uk");
    }
}
