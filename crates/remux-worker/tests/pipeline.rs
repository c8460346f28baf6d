//! Orchestrator property tests.
//!
//! These run the real pipeline against scripted stage handlers, an
//! in-memory checkpoint store, and a recording status sink. Redelivery
//! is simulated by running the pipeline again over the same checkpoint
//! store, which is exactly what a redelivered message does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use remux_models::{ConvertJob, JobId, JobStatus, MediaDescriptor, MediaKind, Stage};
use remux_state::{CheckpointStore, MemoryCheckpointStore};
use remux_storage::StorageError;
use remux_worker::pipeline::{Pipeline, PipelineCause, StatusSink};
use remux_worker::retry::RetryPolicy;
use remux_worker::stage::{JobContext, Liveness, StageHandler, UnitRef};
use remux_worker::StageError;

/// How a scripted failure surfaces.
#[derive(Clone, Copy)]
enum FailureKind {
    /// Non-retryable within the unit (like a broken encode)
    Permanent,
    /// Retryable within the unit (like a storage hiccup)
    Transient,
}

/// A stage handler driven entirely by the test script.
struct ScriptedStage {
    stage: Stage,
    resumable: bool,
    units: Vec<String>,
    /// Shared invocation log, entries are "stage:key"
    invocations: Arc<Mutex<Vec<String>>>,
    /// Remaining scripted failures per unit key
    fail_counts: Mutex<HashMap<String, u32>>,
    fail_kind: FailureKind,
    /// Sleep without ticking liveness, to trip the watchdog
    hang_for: Option<Duration>,
    /// Flip the shutdown switch after processing this key
    shutdown_after: Option<(String, watch::Sender<bool>)>,
}

impl ScriptedStage {
    fn new(stage: Stage, units: &[&str], invocations: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            stage,
            resumable: true,
            units: units.iter().map(|u| u.to_string()).collect(),
            invocations,
            fail_counts: Mutex::new(HashMap::new()),
            fail_kind: FailureKind::Permanent,
            hang_for: None,
            shutdown_after: None,
        }
    }

    fn fail_times(self, key: &str, times: u32, kind: FailureKind) -> Self {
        self.fail_counts
            .lock()
            .unwrap()
            .insert(key.to_string(), times);
        Self {
            fail_kind: kind,
            ..self
        }
    }

    fn non_resumable(mut self) -> Self {
        self.resumable = false;
        self
    }

    fn hang(mut self, duration: Duration) -> Self {
        self.hang_for = Some(duration);
        self
    }

    fn shutdown_after(mut self, key: &str, tx: watch::Sender<bool>) -> Self {
        self.shutdown_after = Some((key.to_string(), tx));
        self
    }
}

#[async_trait]
impl StageHandler for ScriptedStage {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn resumable(&self) -> bool {
        self.resumable
    }

    async fn enumerate(&self, _ctx: &JobContext) -> Result<Vec<UnitRef>, StageError> {
        Ok(self.units.iter().map(UnitRef::new).collect())
    }

    async fn process(
        &self,
        _ctx: &JobContext,
        unit: &UnitRef,
        liveness: Arc<Liveness>,
    ) -> Result<(), StageError> {
        self.invocations
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.stage, unit.key));

        if let Some(duration) = self.hang_for {
            // Deliberately never tick
            tokio::time::sleep(duration).await;
        } else {
            liveness.tick();
        }

        let should_fail = {
            let mut fail_counts = self.fail_counts.lock().unwrap();
            match fail_counts.get_mut(&unit.key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        if should_fail {
            return Err(match self.fail_kind {
                FailureKind::Permanent => StageError::failed("scripted failure"),
                FailureKind::Transient => {
                    StageError::Storage(StorageError::DownloadFailed("scripted".to_string()))
                }
            });
        }

        if let Some((key, tx)) = &self.shutdown_after {
            if &unit.key == key {
                tx.send(true).ok();
            }
        }

        Ok(())
    }
}

/// Status sink that records everything it is asked to emit.
#[derive(Default)]
struct RecordingSink {
    statuses: Mutex<Vec<JobStatus>>,
    percents: Mutex<Vec<u8>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn emit_status(&self, _job_id: &JobId, status: JobStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    async fn emit_progress(&self, _job_id: &JobId, _stage: Stage, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }
}

fn test_job() -> ConvertJob {
    ConvertJob::new(MediaDescriptor {
        name: "Test Media".to_string(),
        kind: MediaKind::Series,
        source_prefix: "originals/test".to_string(),
    })
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn pipeline(
    stages: Vec<Arc<dyn StageHandler>>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<RecordingSink>,
    shutdown: watch::Receiver<bool>,
) -> Pipeline {
    Pipeline::new(
        stages,
        checkpoints,
        sink,
        fast_retry(),
        Duration::from_millis(25),
        shutdown,
    )
}

#[tokio::test]
async fn completes_all_stages_in_order() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let stages: Vec<Arc<dyn StageHandler>> = vec![
        Arc::new(ScriptedStage::new(
            Stage::Fetch,
            &["b", "a"],
            Arc::clone(&invocations),
        )),
        Arc::new(ScriptedStage::new(
            Stage::Transform,
            &["a"],
            Arc::clone(&invocations),
        )),
        Arc::new(ScriptedStage::new(
            Stage::Publish,
            &["a"],
            Arc::clone(&invocations),
        )),
    ];

    let sink = Arc::new(RecordingSink::default());
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        stages,
        Arc::new(MemoryCheckpointStore::new()),
        Arc::clone(&sink),
        rx,
    );

    let ctx = JobContext::new(test_job(), "/tmp/remux-test");
    p.run(&ctx).await.expect("pipeline run");

    // Units within a stage run in key order, stages in pipeline order
    assert_eq!(
        *invocations.lock().unwrap(),
        vec!["fetch:a", "fetch:b", "transform:a", "publish:a"]
    );

    let statuses = sink.statuses.lock().unwrap().clone();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Fetching,
            JobStatus::Transforming,
            JobStatus::Publishing,
            JobStatus::Done,
        ]
    );
    assert_eq!(*sink.percents.lock().unwrap().last().unwrap(), 100);
}

#[tokio::test]
async fn resume_does_not_reinvoke_completed_units() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let job = test_job();
    let job_id = job.job_id.clone();
    let ctx = JobContext::new(job, "/tmp/remux-test");

    // First delivery: unit "c" fails permanently
    let stage = ScriptedStage::new(Stage::Fetch, &["a", "b", "c"], Arc::clone(&invocations))
        .fail_times("c", 1, FailureKind::Permanent);
    let sink = Arc::new(RecordingSink::default());
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::clone(&sink),
        rx,
    );

    let err = p.run(&ctx).await.unwrap_err();
    assert_eq!(err.stage, Stage::Fetch);
    assert_eq!(err.unit_index, 2);
    assert_eq!(
        checkpoints.get_cursor(&job_id, Stage::Fetch).await.unwrap(),
        2
    );
    assert!(sink
        .statuses
        .lock()
        .unwrap()
        .contains(&JobStatus::Errored));

    // Redelivery: only the failed unit runs again
    let stage = ScriptedStage::new(Stage::Fetch, &["a", "b", "c"], Arc::clone(&invocations));
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::new(RecordingSink::default()),
        rx,
    );
    p.run(&ctx).await.expect("second delivery succeeds");

    assert_eq!(
        *invocations.lock().unwrap(),
        vec!["fetch:a", "fetch:b", "fetch:c", "fetch:c"]
    );
    assert_eq!(
        checkpoints.get_cursor(&job_id, Stage::Fetch).await.unwrap(),
        3
    );
}

#[tokio::test]
async fn fail_fast_skips_rest_of_stage_and_keeps_cursor() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let job = test_job();
    let job_id = job.job_id.clone();
    let ctx = JobContext::new(job, "/tmp/remux-test");

    let stage = ScriptedStage::new(Stage::Fetch, &["a", "b", "c"], Arc::clone(&invocations))
        .fail_times("b", u32::MAX, FailureKind::Permanent);
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::new(RecordingSink::default()),
        rx,
    );

    let err = p.run(&ctx).await.unwrap_err();
    assert_eq!(err.unit_index, 1);
    assert!(matches!(err.cause, PipelineCause::Unit(_)));

    // "c" was never attempted; cursor equals the last successful index
    assert_eq!(
        *invocations.lock().unwrap(),
        vec!["fetch:a", "fetch:b"]
    );
    assert_eq!(
        checkpoints.get_cursor(&job_id, Stage::Fetch).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn transient_unit_errors_are_retried_in_place() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let stage = ScriptedStage::new(Stage::Publish, &["a"], Arc::clone(&invocations))
        .fail_times("a", 2, FailureKind::Transient);

    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(RecordingSink::default()),
        rx,
    );

    let ctx = JobContext::new(test_job(), "/tmp/remux-test");
    p.run(&ctx).await.expect("retries exhaust the failures");

    assert_eq!(invocations.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn progress_is_monotonic_across_redelivery() {
    // 3 fetch units, 1 transform, 1 publish; fetch unit 2 fails at the
    // job level, then redelivery finishes the job.
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let sink = Arc::new(RecordingSink::default());
    let job = test_job();
    let job_id = job.job_id.clone();
    let ctx = JobContext::new(job, "/tmp/remux-test");

    let build = |fail: bool, invocations: &Arc<Mutex<Vec<String>>>| -> Vec<Arc<dyn StageHandler>> {
        let fetch = ScriptedStage::new(Stage::Fetch, &["f1", "f2", "f3"], Arc::clone(invocations));
        let fetch = if fail {
            fetch.fail_times("f2", 1, FailureKind::Permanent)
        } else {
            fetch
        };
        vec![
            Arc::new(fetch),
            Arc::new(ScriptedStage::new(
                Stage::Transform,
                &["t1"],
                Arc::clone(invocations),
            )),
            Arc::new(ScriptedStage::new(
                Stage::Publish,
                &["p1"],
                Arc::clone(invocations),
            )),
        ]
    };

    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        build(true, &invocations),
        Arc::clone(&checkpoints),
        Arc::clone(&sink),
        rx,
    );
    p.run(&ctx).await.unwrap_err();

    // Checkpoint sits at the failed unit before the retry
    assert_eq!(
        checkpoints.get_cursor(&job_id, Stage::Fetch).await.unwrap(),
        1
    );

    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        build(false, &invocations),
        Arc::clone(&checkpoints),
        Arc::clone(&sink),
        rx,
    );
    p.run(&ctx).await.expect("redelivery completes");

    let percents = sink.percents.lock().unwrap().clone();
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {percents:?}"
    );
    assert_eq!(*percents.last().unwrap(), 100);

    let statuses = sink.statuses.lock().unwrap().clone();
    assert_eq!(*statuses.last().unwrap(), JobStatus::Done);
}

#[tokio::test]
async fn redelivery_after_success_has_no_new_side_effects() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let ctx = JobContext::new(test_job(), "/tmp/remux-test");

    for _ in 0..2 {
        let stage = ScriptedStage::new(Stage::Fetch, &["a", "b"], Arc::clone(&invocations));
        let (_tx, rx) = watch::channel(false);
        let p = pipeline(
            vec![Arc::new(stage)],
            Arc::clone(&checkpoints),
            Arc::new(RecordingSink::default()),
            rx,
        );
        p.run(&ctx).await.expect("run");
    }

    // The duplicate delivery skipped every checkpointed unit
    assert_eq!(*invocations.lock().unwrap(), vec!["fetch:a", "fetch:b"]);
}

#[tokio::test]
async fn stalled_unit_fails_with_stalled_cause() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let stage = ScriptedStage::new(Stage::Transform, &["a"], Arc::clone(&invocations))
        .hang(Duration::from_secs(5));

    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(RecordingSink::default()),
        rx,
    );

    let ctx = JobContext::new(test_job(), "/tmp/remux-test");
    let err = p.run(&ctx).await.unwrap_err();
    assert!(matches!(err.cause, PipelineCause::Stalled));
}

#[tokio::test]
async fn shutdown_stops_at_unit_boundary_without_errored() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let job = test_job();
    let job_id = job.job_id.clone();
    let ctx = JobContext::new(job, "/tmp/remux-test");

    let (tx, rx) = watch::channel(false);
    let stage = ScriptedStage::new(Stage::Fetch, &["a", "b", "c"], Arc::clone(&invocations))
        .shutdown_after("a", tx);
    let sink = Arc::new(RecordingSink::default());
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::clone(&sink),
        rx,
    );

    let err = p.run(&ctx).await.unwrap_err();
    assert!(err.is_interrupted());

    // The in-progress unit completed and checkpointed; nothing after ran
    assert_eq!(*invocations.lock().unwrap(), vec!["fetch:a"]);
    assert_eq!(
        checkpoints.get_cursor(&job_id, Stage::Fetch).await.unwrap(),
        1
    );

    // No terminal status was emitted; the job is redelivered intact
    let statuses = sink.statuses.lock().unwrap().clone();
    assert!(!statuses.contains(&JobStatus::Errored));
    assert!(!statuses.contains(&JobStatus::Done));
}

#[tokio::test]
async fn non_resumable_stage_restarts_from_zero() {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let job = test_job();
    let job_id = job.job_id.clone();
    let ctx = JobContext::new(job, "/tmp/remux-test");

    // First delivery fails on the second unit
    let stage = ScriptedStage::new(Stage::Publish, &["a", "b"], Arc::clone(&invocations))
        .fail_times("b", 1, FailureKind::Permanent)
        .non_resumable();
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::new(RecordingSink::default()),
        rx,
    );
    p.run(&ctx).await.unwrap_err();

    // No cursor was written
    assert_eq!(
        checkpoints
            .get_cursor(&job_id, Stage::Publish)
            .await
            .unwrap(),
        0
    );

    // Redelivery redoes the whole stage
    let stage = ScriptedStage::new(Stage::Publish, &["a", "b"], Arc::clone(&invocations))
        .non_resumable();
    let (_tx, rx) = watch::channel(false);
    let p = pipeline(
        vec![Arc::new(stage)],
        Arc::clone(&checkpoints),
        Arc::new(RecordingSink::default()),
        rx,
    );
    p.run(&ctx).await.expect("second delivery");

    assert_eq!(
        *invocations.lock().unwrap(),
        vec!["publish:a", "publish:b", "publish:a", "publish:b"]
    );
}
