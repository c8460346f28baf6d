//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs.
    ///
    /// Each job runs one transcode at a time, so this is effectively
    /// the number of parallel encodes the host is allowed.
    pub max_concurrent_jobs: usize,
    /// Work directory for fetched and transcoded files.
    ///
    /// Must survive restarts for checkpoint resume to skip re-fetching.
    pub work_dir: String,
    /// Liveness watch interval; a unit with no observable progress for
    /// two consecutive intervals is failed as stalled
    pub watch_interval: Duration,
    /// Total-time budget for one transcode
    pub transcode_timeout: Duration,
    /// How often the worker scans for orphaned pending jobs
    pub claim_interval: Duration,
    /// How often due delayed requeues are drained back into the stream
    pub requeue_interval: Duration,
    /// How long shutdown waits for in-flight jobs to reach a unit
    /// boundary before abandoning them to the consumer group
    pub shutdown_timeout: Duration,
    /// Port for the health/metrics server
    pub health_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            work_dir: "/var/lib/remux/work".to_string(),
            watch_interval: Duration::from_secs(20),
            transcode_timeout: Duration::from_secs(4 * 3600),
            claim_interval: Duration::from_secs(30),
            requeue_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
            health_port: 3401,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            watch_interval: Duration::from_secs(
                std::env::var("WORKER_WATCH_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
            ),
            transcode_timeout: Duration::from_secs(
                std::env::var("WORKER_TRANSCODE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4 * 3600),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            requeue_interval: Duration::from_secs(
                std::env::var("WORKER_REQUEUE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            health_port: std::env::var("WORKER_HEALTH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.health_port),
        }
    }
}
