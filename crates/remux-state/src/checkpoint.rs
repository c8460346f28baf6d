//! Checkpoint store trait and the Redis implementation.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use remux_models::{JobId, Stage};

use crate::error::StateResult;

/// Durable `(job, stage) → cursor` mapping.
///
/// The cursor is the index of the next unit to process. It is written
/// synchronously after each unit completes and before the next unit
/// starts, so after a crash at most one unit is re-done. No cursor is
/// ever advanced speculatively.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the cursor for a stage. Missing entries read as 0.
    async fn get_cursor(&self, job: &JobId, stage: Stage) -> StateResult<u32>;

    /// Persist the cursor for a stage.
    async fn set_cursor(&self, job: &JobId, stage: Stage, cursor: u32) -> StateResult<()>;

    /// Drop all of a job's cursors. Called once the job is acknowledged.
    async fn clear(&self, job: &JobId) -> StateResult<()>;
}

/// Configuration for the Redis checkpoint store.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Redis URL
    pub redis_url: String,
    /// TTL for checkpoint keys, in seconds
    pub checkpoint_ttl_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            checkpoint_ttl_secs: 7 * 24 * 3600,
        }
    }
}

impl StateConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            checkpoint_ttl_secs: std::env::var("CHECKPOINT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7 * 24 * 3600),
        }
    }
}

/// Redis-backed checkpoint store.
///
/// One key per `(job, stage)`. Keys expire after the configured TTL so
/// abandoned jobs don't accumulate state forever.
pub struct RedisCheckpointStore {
    client: redis::Client,
    config: StateConfig,
}

impl RedisCheckpointStore {
    /// Create a new store.
    pub fn new(config: StateConfig) -> StateResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StateResult<Self> {
        Self::new(StateConfig::from_env())
    }

    fn key(job: &JobId, stage: Stage) -> String {
        format!("remux:checkpoint:{}:{}", job, stage)
    }
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    async fn get_cursor(&self, job: &JobId, stage: Stage) -> StateResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cursor: Option<u32> = conn.get(Self::key(job, stage)).await?;
        Ok(cursor.unwrap_or(0))
    }

    async fn set_cursor(&self, job: &JobId, stage: Stage, cursor: u32) -> StateResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::key(job, stage), cursor, self.config.checkpoint_ttl_secs)
            .await?;
        debug!(job_id = %job, stage = %stage, cursor, "Checkpoint persisted");
        Ok(())
    }

    async fn clear(&self, job: &JobId) -> StateResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = Stage::ORDERED
            .iter()
            .map(|stage| Self::key(job, *stage))
            .collect();
        conn.del::<_, ()>(keys).await?;
        debug!(job_id = %job, "Checkpoints cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shape() {
        let job = JobId::from_string("job-1");
        assert_eq!(
            RedisCheckpointStore::key(&job, Stage::Transform),
            "remux:checkpoint:job-1:transform"
        );
    }
}
