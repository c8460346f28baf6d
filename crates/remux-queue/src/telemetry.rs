//! Telemetry events via Redis Pub/Sub.
//!
//! Everything here is best-effort: the worker never fails a job because
//! the telemetry sink is unreachable. Callers discard the result with
//! `.ok()`.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use remux_models::{JobId, JobStatus, Stage, TelemetryMessage};

use crate::error::QueueResult;

/// Telemetry event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Job ID
    pub job_id: JobId,
    /// Message payload
    pub message: TelemetryMessage,
}

/// Channel for publishing/subscribing to telemetry events.
#[derive(Clone)]
pub struct TelemetryChannel {
    client: redis::Client,
}

impl TelemetryChannel {
    /// Create a new telemetry channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&redis_url)
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("remux:events:{}", job_id)
    }

    /// Publish a telemetry event.
    pub async fn publish(&self, event: &TelemetryEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing telemetry event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a coarse status transition.
    pub async fn status(&self, job_id: &JobId, status: JobStatus) -> QueueResult<()> {
        self.publish(&TelemetryEvent {
            job_id: job_id.clone(),
            message: TelemetryMessage::status(status),
        })
        .await
    }

    /// Publish a progress update.
    pub async fn progress(&self, job_id: &JobId, stage: Stage, percent: u8) -> QueueResult<()> {
        self.publish(&TelemetryEvent {
            job_id: job_id.clone(),
            message: TelemetryMessage::progress(stage, percent),
        })
        .await
    }

    /// Publish a log message.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&TelemetryEvent {
            job_id: job_id.clone(),
            message: TelemetryMessage::log(message),
        })
        .await
    }

    /// Publish an error message.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&TelemetryEvent {
            job_id: job_id.clone(),
            message: TelemetryMessage::error(message),
        })
        .await
    }

    /// Subscribe to telemetry events for a job.
    ///
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = TelemetryEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
