//! The pipeline orchestrator.
//!
//! Drives one job through its stages in fixed order. Within a stage,
//! units run strictly sequentially: process unit, persist cursor, emit
//! progress, next unit. A failed unit aborts the stage immediately with
//! the cursor still pointing at it, so broker redelivery retries exactly
//! that unit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use remux_models::{JobId, JobStatus, Stage};
use remux_queue::TelemetryChannel;
use remux_state::{CheckpointStore, StateError};

use crate::error::StageError;
use crate::retry::RetryPolicy;
use crate::stage::{JobContext, Liveness, StageHandler, UnitRef};

/// Destination for status transitions and progress updates.
///
/// Implementations are best-effort: emission failures must never fail
/// the job.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn emit_status(&self, job_id: &JobId, status: JobStatus);
    async fn emit_progress(&self, job_id: &JobId, stage: Stage, percent: u8);
}

#[async_trait]
impl StatusSink for TelemetryChannel {
    async fn emit_status(&self, job_id: &JobId, status: JobStatus) {
        if let Err(e) = self.status(job_id, status).await {
            warn!(job_id = %job_id, "Failed to emit status: {}", e);
        }
    }

    async fn emit_progress(&self, job_id: &JobId, stage: Stage, percent: u8) {
        if let Err(e) = self.progress(job_id, stage, percent).await {
            warn!(job_id = %job_id, "Failed to emit progress: {}", e);
        }
    }
}

/// Why a pipeline run failed.
#[derive(Debug, Error)]
pub enum PipelineCause {
    #[error("{0}")]
    Unit(#[from] StageError),

    #[error("no progress within watch window")]
    Stalled,

    #[error("unit enumeration failed: {0}")]
    Enumerate(StageError),

    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] StateError),

    #[error("shutdown requested")]
    Interrupted,
}

/// A failed pipeline run, pinned to the stage and unit that failed.
#[derive(Debug, Error)]
#[error("stage {stage} failed at unit {unit_index}: {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    pub unit_index: u32,
    pub cause: PipelineCause,
}

impl PipelineError {
    fn new(stage: Stage, unit_index: u32, cause: PipelineCause) -> Self {
        Self {
            stage,
            unit_index,
            cause,
        }
    }

    /// True when the run was cut short by shutdown rather than failing.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.cause, PipelineCause::Interrupted)
    }
}

/// Progress accounting across all stages of one job.
///
/// Totals are learned as stages are entered; stages not yet entered are
/// assumed to carry as many units as the most recently entered stage
/// (each stage operates roughly 1:1 on the previous stage's outputs).
/// Emitted percent never regresses, even when a re-derived enumeration
/// shrinks the totals.
#[derive(Debug)]
struct ProgressRatchet {
    stage_totals: Vec<Option<u32>>,
    completed: u32,
    last_emitted: u8,
}

impl ProgressRatchet {
    fn new(num_stages: usize) -> Self {
        Self {
            stage_totals: vec![None; num_stages],
            completed: 0,
            last_emitted: 0,
        }
    }

    /// Record stage entry: its re-derived total and the units already
    /// completed per the checkpoint.
    fn enter_stage(&mut self, stage_index: usize, total: u32, resumed: u32) {
        self.stage_totals[stage_index] = Some(total);
        self.completed += resumed.min(total);
    }

    fn complete_unit(&mut self) {
        self.completed += 1;
    }

    fn estimated_total(&self) -> u32 {
        let mut total = 0u32;
        let mut last_known = None;
        for stage_total in &self.stage_totals {
            match stage_total {
                Some(n) => {
                    total += n;
                    last_known = Some(*n);
                }
                None => total += last_known.unwrap_or(0),
            }
        }
        total
    }

    /// Current percent, monotonically non-decreasing.
    fn percent(&mut self) -> u8 {
        let total = self.estimated_total();
        let pct = if total == 0 {
            100
        } else {
            ((self.completed as u64 * 100) / total as u64).min(100) as u8
        };
        self.last_emitted = self.last_emitted.max(pct);
        self.last_emitted
    }
}

/// The pipeline orchestrator.
pub struct Pipeline {
    stages: Vec<Arc<dyn StageHandler>>,
    checkpoints: Arc<dyn CheckpointStore>,
    status: Arc<dyn StatusSink>,
    retry: RetryPolicy,
    watch_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Pipeline {
    /// Create a pipeline over an ordered list of stage handlers.
    pub fn new(
        stages: Vec<Arc<dyn StageHandler>>,
        checkpoints: Arc<dyn CheckpointStore>,
        status: Arc<dyn StatusSink>,
        retry: RetryPolicy,
        watch_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stages,
            checkpoints,
            status,
            retry,
            watch_interval,
            shutdown,
        }
    }

    /// Run one job to completion.
    ///
    /// Emits `done`/100 on success, `errored` on failure. A run cut
    /// short by shutdown emits neither; the job is redelivered intact.
    pub async fn run(&self, ctx: &JobContext) -> Result<(), PipelineError> {
        let job_id = ctx.job_id().clone();

        match self.run_stages(ctx).await {
            Ok(last_stage) => {
                if let Some(stage) = last_stage {
                    self.status.emit_progress(&job_id, stage, 100).await;
                }
                self.status.emit_status(&job_id, JobStatus::Done).await;
                info!(job_id = %job_id, "Pipeline complete");
                Ok(())
            }
            Err(e) => {
                if !e.is_interrupted() {
                    self.status.emit_status(&job_id, JobStatus::Errored).await;
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, ctx: &JobContext) -> Result<Option<Stage>, PipelineError> {
        let job_id = ctx.job_id().clone();
        let mut progress = ProgressRatchet::new(self.stages.len());
        let mut last_stage = None;

        for (stage_index, handler) in self.stages.iter().enumerate() {
            let stage = handler.stage();
            last_stage = Some(stage);

            self.status
                .emit_status(&job_id, JobStatus::for_stage(stage))
                .await;

            let mut units = handler
                .enumerate(ctx)
                .await
                .map_err(|e| PipelineError::new(stage, 0, PipelineCause::Enumerate(e)))?;
            units.sort_by(|a, b| a.key.cmp(&b.key));

            let cursor = if handler.resumable() {
                self.checkpoints
                    .get_cursor(&job_id, stage)
                    .await
                    .map_err(|e| PipelineError::new(stage, 0, e.into()))?
            } else {
                0
            };
            let cursor = (cursor as usize).min(units.len());

            if cursor > 0 {
                info!(
                    job_id = %job_id,
                    stage = %stage,
                    cursor,
                    total = units.len(),
                    "Resuming stage from checkpoint"
                );
            }

            progress.enter_stage(stage_index, units.len() as u32, cursor as u32);
            self.status
                .emit_progress(&job_id, stage, progress.percent())
                .await;

            for (index, unit) in units.iter().enumerate().skip(cursor) {
                if *self.shutdown.borrow() {
                    return Err(PipelineError::new(
                        stage,
                        index as u32,
                        PipelineCause::Interrupted,
                    ));
                }

                self.retry
                    .run(
                        stage.as_str(),
                        |cause| matches!(cause, PipelineCause::Unit(e) if e.is_retryable()),
                        || self.attempt_unit(ctx, handler.as_ref(), unit),
                    )
                    .await
                    .map_err(|cause| PipelineError::new(stage, index as u32, cause))?;

                // The unit only counts once its checkpoint is durable
                if handler.resumable() {
                    self.checkpoints
                        .set_cursor(&job_id, stage, index as u32 + 1)
                        .await
                        .map_err(|e| PipelineError::new(stage, index as u32, e.into()))?;
                }

                progress.complete_unit();
                self.status
                    .emit_progress(&job_id, stage, progress.percent())
                    .await;
            }
        }

        Ok(last_stage)
    }

    /// One invocation of one unit, raced against the stall watchdog.
    async fn attempt_unit(
        &self,
        ctx: &JobContext,
        handler: &dyn StageHandler,
        unit: &UnitRef,
    ) -> Result<(), PipelineCause> {
        let liveness = Arc::new(Liveness::new());
        let process = handler.process(ctx, unit, Arc::clone(&liveness));
        tokio::pin!(process);

        let mut watch = tokio::time::interval(self.watch_interval);
        watch.tick().await; // consume the immediate first tick
        let mut idle_intervals = 0u32;

        loop {
            tokio::select! {
                result = &mut process => {
                    return result.map_err(PipelineCause::Unit);
                }
                _ = watch.tick() => {
                    if liveness.idle() >= self.watch_interval {
                        idle_intervals += 1;
                        if idle_intervals >= 2 {
                            warn!(
                                stage = %handler.stage(),
                                unit = %unit.key,
                                "Unit made no progress for two watch intervals"
                            );
                            return Err(PipelineCause::Stalled);
                        }
                    } else {
                        idle_intervals = 0;
                    }
                }
            }
        }
    }
}
