//! Fetch progress reporting.
//!
//! The fetch capability reports through a [`FetchEventSink`]: one call per
//! progress update and one per log line. The sink decides what to forward.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dubpipe_models::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Downloading,
    Finished,
    Error,
}

impl FetchStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "downloading" => Some(FetchStatus::Downloading),
            "finished" => Some(FetchStatus::Finished),
            "error" => Some(FetchStatus::Error),
            _ => None,
        }
    }
}

/// One progress update from the fetch capability.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchProgress {
    pub status: FetchStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    /// Used when the exact total is unknown
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<u64>,
    pub error: Option<String>,
}

impl FetchProgress {
    pub fn new(status: FetchStatus) -> Self {
        Self {
            status,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            error: None,
        }
    }

    /// Exact total if known, else the estimate.
    pub fn total(&self) -> Option<u64> {
        self.total_bytes.or(self.total_bytes_estimate)
    }

    /// Percent complete in `[0, 100]`, rounded to two decimals.
    ///
    /// Zero until a positive total is known.
    pub fn percent(&self) -> f64 {
        let total = match self.total() {
            Some(t) if t > 0 => t as f64,
            _ => return 0.0,
        };
        let downloaded = self.downloaded_bytes.unwrap_or(0) as f64;
        let pct = (downloaded / total * 100.0).clamp(0.0, 100.0);
        (pct * 100.0).round() / 100.0
    }
}

/// Receiver for capability callbacks during a download.
#[async_trait]
pub trait FetchEventSink: Send + Sync {
    async fn on_progress(&self, progress: FetchProgress);

    async fn on_log(&self, level: LogLevel, line: &str);
}

/// Whether a capability log line is worth forwarding as a log event.
///
/// Drops verbose debug output and lines that merely repeat progress already
/// reported through [`FetchEventSink::on_progress`]. Warnings and errors
/// always pass.
pub fn should_forward_log(level: LogLevel, line: &str) -> bool {
    match level {
        LogLevel::Warning | LogLevel::Error => true,
        LogLevel::Debug | LogLevel::Info => {
            if level == LogLevel::Debug && line.starts_with("[debug]") {
                return false;
            }
            if line.contains("[download]")
                && (line.contains('%')
                    || line.contains("ETA")
                    || line.contains("MiB")
                    || line.contains("KiB"))
            {
                return false;
            }
            !(line.contains("Downloading f") || line.to_lowercase().contains("frag "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(downloaded: u64, total: Option<u64>, estimate: Option<u64>) -> FetchProgress {
        FetchProgress {
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            total_bytes_estimate: estimate,
            ..FetchProgress::new(FetchStatus::Downloading)
        }
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(downloading(1, Some(3), None).percent(), 33.33);
        assert_eq!(downloading(50, Some(100), None).percent(), 50.0);
    }

    #[test]
    fn test_percent_unknown_total() {
        assert_eq!(downloading(500, None, None).percent(), 0.0);
        assert_eq!(downloading(500, Some(0), None).percent(), 0.0);
        assert_eq!(downloading(25, None, Some(100)).percent(), 25.0);
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(downloading(150, Some(100), None).percent(), 100.0);
    }

    #[test]
    fn test_log_filter() {
        assert!(!should_forward_log(LogLevel::Debug, "[debug] Command-line config"));
        assert!(!should_forward_log(
            LogLevel::Info,
            "[download]  42.0% of 10.00MiB at 1.00MiB/s ETA 00:06"
        ));
        assert!(!should_forward_log(LogLevel::Info, "[youtube] abc: Downloading format 137"));
        assert!(!should_forward_log(LogLevel::Debug, "[hlsnative] Frag 3 of 10"));
        assert!(should_forward_log(LogLevel::Info, "[Merger] Merging formats into \"a.mkv\""));
        assert!(should_forward_log(LogLevel::Warning, "[download] 10% whatever"));
        assert!(should_forward_log(LogLevel::Error, "[debug] still forwarded"));
    }
}
