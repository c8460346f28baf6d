//! Job executor.
//!
//! Consumes job messages and turns pipeline outcomes into broker
//! acknowledgments: success acks, failure nacks for delayed redelivery,
//! repeated failure dead-letters. Concurrency is bounded by a
//! semaphore; in-flight jobs are tracked for the health surface and for
//! graceful shutdown accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use remux_catalog::CatalogClient;
use remux_media::TranscodeSettings;
use remux_models::ConvertJob;
use remux_queue::{JobQueue, TelemetryChannel};
use remux_state::{CheckpointStore, RedisCheckpointStore};
use remux_storage::ObjectStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::pipeline::{Pipeline, StatusSink};
use crate::retry::RetryPolicy;
use crate::stage::{JobContext, StageHandler};
use crate::stages::{FetchStage, PublishStage, TransformStage};

/// Shared clients used to build a job's stage handlers.
pub struct ProcessingContext {
    pub store: ObjectStore,
    pub catalog: CatalogClient,
    pub transcode: TranscodeSettings,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub telemetry: Arc<TelemetryChannel>,
}

impl ProcessingContext {
    /// Build all clients from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            store: ObjectStore::from_env()?,
            catalog: CatalogClient::from_env()?,
            transcode: TranscodeSettings::from_env(),
            checkpoints: Arc::new(RedisCheckpointStore::from_env()?),
            telemetry: Arc::new(TelemetryChannel::from_env()?),
        })
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<ProcessingContext>,
    job_semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: ProcessingContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            in_flight: Arc::new(AtomicUsize::new(0)),
            abandoned: Arc::new(AtomicUsize::new(0)),
            shutdown,
            consumer_name,
        }
    }

    /// Handle to the in-flight counter, for the health surface.
    pub fn in_flight_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.in_flight)
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run until shutdown. Returns the number of jobs that were in
    /// flight at shutdown and handed back to the broker.
    pub async fn run(&self) -> WorkerResult<usize> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut claim_timer = tokio::time::interval(self.config.claim_interval);
        let mut requeue_timer = tokio::time::interval(self.config.requeue_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = requeue_timer.tick() => {
                    if let Err(e) = self.queue.requeue_due().await {
                        warn!("Failed to requeue delayed jobs: {}", e);
                    }
                }
                _ = claim_timer.tick() => {
                    match self.queue.claim_pending(&self.consumer_name, 5).await {
                        Ok(jobs) if !jobs.is_empty() => {
                            info!("Claimed {} pending jobs", jobs.len());
                            for (message_id, job) in jobs {
                                self.spawn_job(message_id, job).await;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim pending jobs: {}", e),
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        // In-flight jobs nack themselves at the next unit boundary;
        // anything still running after the timeout stays pending in the
        // consumer group for another worker to claim.
        info!("Waiting for in-flight jobs to reach a unit boundary...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        let leftover = self.in_flight.load(Ordering::SeqCst);
        if leftover > 0 {
            warn!("{} jobs still running at shutdown, leaving them pending", leftover);
        }

        let abandoned = self.abandoned.load(Ordering::SeqCst) + leftover;
        info!("Job executor stopped ({} jobs handed back)", abandoned);
        Ok(abandoned)
    }

    /// Consume new messages, up to the free concurrency slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            self.spawn_job(message_id, job).await;
        }

        Ok(())
    }

    /// Dispatch one job onto its own task, bounded by the semaphore.
    async fn spawn_job(&self, message_id: String, job: ConvertJob) {
        let permit = match Arc::clone(&self.job_semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let ctx = Arc::clone(&self.ctx);
        let queue = Arc::clone(&self.queue);
        let config = self.config.clone();
        let shutdown_rx = self.shutdown.subscribe();
        let in_flight = Arc::clone(&self.in_flight);
        let abandoned = Arc::clone(&self.abandoned);

        tokio::spawn(async move {
            let _permit = permit;
            in_flight.fetch_add(1, Ordering::SeqCst);
            gauge!("remux_jobs_in_flight").increment(1.0);

            Self::execute_job(ctx, queue, config, shutdown_rx, message_id, job, abandoned).await;

            in_flight.fetch_sub(1, Ordering::SeqCst);
            gauge!("remux_jobs_in_flight").decrement(1.0);
        });
    }

    /// Run one job through the pipeline and settle its message.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
        message_id: String,
        job: ConvertJob,
        abandoned: Arc<AtomicUsize>,
    ) {
        let logger = JobLogger::new(&job.job_id, "convert");
        logger.log_start(&format!("processing '{}'", job.media.name));

        let job_ctx = JobContext::new(job.clone(), &config.work_dir);
        for dir in [job_ctx.source_dir(), job_ctx.out_dir()] {
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                logger.log_error(&format!("failed to create {}: {}", dir.display(), e));
                if let Err(e) = queue.nack_delayed(&message_id, &job).await {
                    error!("Failed to nack job {}: {}", job.job_id, e);
                }
                return;
            }
        }

        let stages: Vec<Arc<dyn StageHandler>> = vec![
            Arc::new(FetchStage::new(ctx.store.clone())),
            Arc::new(TransformStage::new(
                ctx.transcode.clone(),
                config.transcode_timeout,
            )),
            Arc::new(PublishStage::new(ctx.catalog.clone())),
        ];

        let pipeline = Pipeline::new(
            stages,
            Arc::clone(&ctx.checkpoints),
            Arc::clone(&ctx.telemetry) as Arc<dyn StatusSink>,
            RetryPolicy::from_env(),
            config.watch_interval,
            shutdown_rx,
        );

        match pipeline.run(&job_ctx).await {
            Ok(()) => {
                logger.log_completion("all stages complete");
                counter!("remux_jobs_completed").increment(1);

                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job.job_id, e);
                }
                if let Err(e) = queue.clear_job_state(&job).await {
                    warn!("Failed to clear queue state for job {}: {}", job.job_id, e);
                }
                if let Err(e) = ctx.checkpoints.clear(&job.job_id).await {
                    warn!("Failed to clear checkpoints for job {}: {}", job.job_id, e);
                }
                tokio::fs::remove_dir_all(&job_ctx.work_dir).await.ok();
            }
            Err(e) if e.is_interrupted() => {
                logger.log_warning("shutdown mid-job, handing back for redelivery");
                abandoned.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = queue.nack_delayed(&message_id, &job).await {
                    error!("Failed to nack job {}: {}", job.job_id, e);
                }
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                counter!("remux_jobs_failed").increment(1);

                let retry_count = queue.increment_retry(&job.job_id).await.unwrap_or(u32::MAX);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Job {} exceeded max retries ({}), moving to DLQ",
                        job.job_id, max_retries
                    );
                    counter!("remux_jobs_dead_lettered").increment(1);

                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("Failed to move job {} to DLQ: {}", job.job_id, dlq_err);
                    }
                    if let Err(e) = queue.clear_job_state(&job).await {
                        warn!("Failed to clear queue state for job {}: {}", job.job_id, e);
                    }
                    ctx.telemetry
                        .error(
                            &job.job_id,
                            format!("Job failed after {} retries: {}", max_retries, e),
                        )
                        .await
                        .ok();
                } else {
                    info!(
                        "Job {} will be retried (attempt {}/{})",
                        job.job_id, retry_count, max_retries
                    );
                    if let Err(e) = queue.nack_delayed(&message_id, &job).await {
                        error!("Failed to nack job {}: {}", job.job_id, e);
                    }
                }
            }
        }
    }

    /// Wait for all in-flight jobs to settle.
    async fn wait_for_jobs(&self) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
