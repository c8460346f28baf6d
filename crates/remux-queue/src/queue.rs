//! Job queue using Redis Streams.
//!
//! One message per job. Acknowledgment semantics:
//! - success → `XACK` + `XDEL` (the message is gone for good)
//! - transient failure → delayed requeue: the payload is parked in a
//!   sorted set scored by its due time, then re-added to the stream by
//!   [`JobQueue::requeue_due`]
//! - poison payload → acknowledged and copied to the DLQ stream, never
//!   retried
//! - crashed worker → the message stays pending in the consumer group
//!   until another consumer claims it via [`JobQueue::claim_pending`]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use remux_models::{ConvertJob, JobId};

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Sorted set holding delayed requeues
    pub delayed_set_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Delay before a nacked job is redelivered
    pub requeue_delay: Duration,
    /// Idle time before a pending message from a dead consumer is claimed
    pub claim_min_idle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "remux:jobs".to_string(),
            consumer_group: "remux:workers".to_string(),
            dlq_stream_name: "remux:dlq".to_string(),
            delayed_set_name: "remux:delayed".to_string(),
            max_retries: 3,
            requeue_delay: Duration::from_secs(5),
            claim_min_idle: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            delayed_set_name: std::env::var("QUEUE_DELAYED_SET")
                .unwrap_or(defaults.delayed_set_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            requeue_delay: Duration::from_secs(
                std::env::var("QUEUE_REQUEUE_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("QUEUE_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a convert job.
    pub async fn enqueue(&self, job: &ConvertJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        let dedup_key = format!("remux:dedup:{}", idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        // Dedup window: 1 hour
        conn.set_ex::<_, _, ()>(&dedup_key, "1", 3600).await?;

        info!("Enqueued job {} with message ID {}", job.job_id, message_id);
        Ok(message_id)
    }

    /// Acknowledge a job (mark as completed, remove from the stream).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Negative-acknowledge a job: park the payload for redelivery after
    /// the configured delay, then ack the original message.
    ///
    /// The payload is parked before the ack so a crash in between leaves
    /// the message pending rather than lost.
    pub async fn nack_delayed(&self, message_id: &str, job: &ConvertJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let due_at = unix_millis() + self.config.requeue_delay.as_millis() as u64;

        conn.zadd::<_, _, _, ()>(&self.config.delayed_set_name, &payload, due_at)
            .await?;
        self.ack(message_id).await?;

        info!(
            "Nacked job {}, redelivery in {:?}",
            job.job_id, self.config.requeue_delay
        );
        Ok(())
    }

    /// Move due delayed payloads back into the stream.
    ///
    /// Called periodically by the executor. Returns the number requeued.
    pub async fn requeue_due(&self) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now = unix_millis();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.delayed_set_name)
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let mut requeued = 0;
        for payload in due {
            redis::cmd("XADD")
                .arg(&self.config.stream_name)
                .arg("*")
                .arg("job")
                .arg(&payload)
                .query_async::<()>(&mut conn)
                .await?;
            conn.zrem::<_, _, ()>(&self.config.delayed_set_name, &payload)
                .await?;
            requeued += 1;
        }

        if requeued > 0 {
            debug!("Requeued {} delayed jobs", requeued);
        }
        Ok(requeued)
    }

    /// Move a job to the dead letter queue and ack the original message.
    pub async fn dlq(&self, message_id: &str, job: &ConvertJob, error: &str) -> QueueResult<()> {
        let payload = serde_json::to_string(job)?;
        self.dlq_raw(message_id, &payload, error).await?;
        warn!("Moved job {} to DLQ: {}", job.job_id, error);
        Ok(())
    }

    /// Dead-letter a raw payload (used for poison messages that never
    /// decoded into a job).
    pub async fn dlq_raw(&self, message_id: &str, payload: &str, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await
    }

    /// Consume jobs from the queue.
    ///
    /// Payloads that fail to decode or validate are poison messages:
    /// they are dead-lettered and acknowledged here, so the caller only
    /// ever sees well-formed jobs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, ConvertJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload).to_string();
                    match ConvertJob::decode(&payload_str) {
                        Ok(job) => {
                            debug!("Consumed job {} from stream", job.job_id);
                            jobs.push((message_id, job));
                        }
                        Err(e) => {
                            warn!("Rejecting poison message {}: {}", message_id, e);
                            self.dlq_raw(&message_id, &payload_str, &e.to_string())
                                .await
                                .ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Claim pending jobs that have been idle for too long.
    ///
    /// This handles jobs from crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, ConvertJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.claim_min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for entry in result.ids {
            let message_id = entry.id.clone();

            if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                let payload_str = String::from_utf8_lossy(payload).to_string();
                match ConvertJob::decode(&payload_str) {
                    Ok(job) => {
                        info!("Claimed pending job {} from stream", job.job_id);
                        jobs.push((message_id, job));
                    }
                    Err(e) => {
                        warn!("Rejecting claimed poison message {}: {}", message_id, e);
                        self.dlq_raw(&message_id, &payload_str, &e.to_string())
                            .await
                            .ok();
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Get retry count for a job.
    pub async fn get_retry_count(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("remux:retry:{}", job_id);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment retry count for a job.
    ///
    /// Keyed by job id rather than message id: a delayed requeue mints a
    /// new message id, but the retry budget belongs to the job.
    pub async fn increment_retry(&self, job_id: &JobId) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("remux:retry:{}", job_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    /// Drop a job's dedup and retry keys once it reaches a terminal state.
    pub async fn clear_job_state(&self, job: &ConvertJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let dedup_key = format!("remux:dedup:{}", job.idempotency_key());
        let retry_key = format!("remux:retry:{}", job.job_id);
        conn.del::<_, ()>(&[dedup_key, retry_key]).await?;
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_millis() as u64
}
