//! The stage-handler contract.
//!
//! A stage enumerates its units (files, typically), then the
//! orchestrator drives `process` one unit at a time in key order.
//! Everything a handler needs travels in the per-job [`JobContext`];
//! there is no process-wide registry of live jobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use remux_models::{ConvertJob, JobId, Stage};

use crate::error::StageError;

/// Reference to one unit of work within a stage.
///
/// The key is the stable ordering key (an object key or file name);
/// unit order is lexicographic by key and identical across resumptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub key: String,
}

impl UnitRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Per-job context passed through the pipeline.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// The inbound job
    pub job: ConvertJob,
    /// This job's private work directory
    pub work_dir: PathBuf,
}

impl JobContext {
    /// Create a context rooted at `{base_work_dir}/{job_id}`.
    pub fn new(job: ConvertJob, base_work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = base_work_dir.into().join(job.job_id.as_str());
        Self { job, work_dir }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.job_id
    }

    /// Where fetched source files land.
    pub fn source_dir(&self) -> PathBuf {
        self.work_dir.join("source")
    }

    /// Where transcoded files land.
    pub fn out_dir(&self) -> PathBuf {
        self.work_dir.join("out")
    }
}

/// Liveness handle for one unit invocation.
///
/// Handlers tick it whenever they observe progress (a body chunk, an
/// encoder progress line, a completed request). The orchestrator's
/// watchdog fails the unit as stalled after two consecutive watch
/// intervals without a tick.
#[derive(Debug)]
pub struct Liveness {
    last_tick: Mutex<Instant>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            last_tick: Mutex::new(Instant::now()),
        }
    }

    /// Record observable progress.
    pub fn tick(&self) {
        *self.last_tick.lock().expect("liveness lock poisoned") = Instant::now();
    }

    /// Time since the last tick.
    pub fn idle(&self) -> Duration {
        self.last_tick
            .lock()
            .expect("liveness lock poisoned")
            .elapsed()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// One stage of the pipeline.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Which stage this handler implements.
    fn stage(&self) -> Stage;

    /// Whether this stage persists a per-unit cursor.
    ///
    /// Non-resumable stages always start at unit 0 and write no
    /// checkpoints; a redelivered job redoes them wholesale.
    fn resumable(&self) -> bool {
        true
    }

    /// Enumerate this stage's units.
    ///
    /// Re-derived on every run, including after a crash; the result is
    /// not authoritative for progress accounting.
    async fn enumerate(&self, ctx: &JobContext) -> Result<Vec<UnitRef>, StageError>;

    /// Process exactly one unit.
    async fn process(
        &self,
        ctx: &JobContext,
        unit: &UnitRef,
        liveness: Arc<Liveness>,
    ) -> Result<(), StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use remux_models::{MediaDescriptor, MediaKind};

    #[test]
    fn context_paths_are_job_scoped() {
        let job = ConvertJob::new(MediaDescriptor {
            name: "n".to_string(),
            kind: MediaKind::Movie,
            source_prefix: "p".to_string(),
        });
        let id = job.job_id.clone();
        let ctx = JobContext::new(job, "/tmp/work");

        assert_eq!(ctx.work_dir, PathBuf::from("/tmp/work").join(id.as_str()));
        assert!(ctx.source_dir().ends_with("source"));
        assert!(ctx.out_dir().ends_with("out"));
    }

    #[test]
    fn liveness_tick_resets_idle() {
        let liveness = Liveness::new();
        std::thread::sleep(Duration::from_millis(10));
        assert!(liveness.idle() >= Duration::from_millis(10));
        liveness.tick();
        assert!(liveness.idle() < Duration::from_millis(10));
    }
}
