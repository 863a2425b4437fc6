//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use sndx_media::DEFAULT_SEGMENT_MS;
use sndx_models::SOUND_EXTRACTOR_MESSAGE_TYPE;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent tasks
    pub max_concurrent_tasks: usize,
    /// Root directory for per-task scratch files
    pub scratch_dir: PathBuf,
    /// Length of one audio chunk in milliseconds
    pub segment_ms: u64,
    /// Per-call ffmpeg timeout; `None` lets transcodes run unbounded
    pub ffmpeg_timeout: Option<Duration>,
    /// Type tag attached to every status message
    pub message_type: String,
    /// How often the worker scans for orphaned pending tasks
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus listener address; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            scratch_dir: PathBuf::from("/tmp/sndx"),
            segment_ms: DEFAULT_SEGMENT_MS,
            ffmpeg_timeout: None,
            message_type: SOUND_EXTRACTOR_MESSAGE_TYPE.to_string(),
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: std::env::var("WORKER_MAX_TASKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_tasks),
            scratch_dir: std::env::var("WORKER_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            segment_ms: std::env::var("WORKER_SEGMENT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.segment_ms),
            ffmpeg_timeout: std::env::var("WORKER_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            message_type: std::env::var("SNDX_MESSAGE_TYPE").unwrap_or(defaults.message_type),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.segment_ms, 300_000);
        assert_eq!(config.message_type, "App\\Protobuf\\SoundExtractorMessage");
        assert!(config.ffmpeg_timeout.is_none());
        assert!(config.metrics_addr.is_none());
    }
}
