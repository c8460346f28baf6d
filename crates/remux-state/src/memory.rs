//! In-memory checkpoint store.
//!
//! Not durable. Used by tests and single-process local runs where a
//! crash is allowed to restart the job from scratch.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use remux_models::{JobId, Stage};

use crate::checkpoint::CheckpointStore;
use crate::error::StateResult;

/// Checkpoint store backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    cursors: Mutex<HashMap<(String, Stage), u32>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_cursor(&self, job: &JobId, stage: Stage) -> StateResult<u32> {
        let cursors = self.cursors.lock().expect("checkpoint map poisoned");
        Ok(cursors
            .get(&(job.to_string(), stage))
            .copied()
            .unwrap_or(0))
    }

    async fn set_cursor(&self, job: &JobId, stage: Stage, cursor: u32) -> StateResult<()> {
        let mut cursors = self.cursors.lock().expect("checkpoint map poisoned");
        cursors.insert((job.to_string(), stage), cursor);
        Ok(())
    }

    async fn clear(&self, job: &JobId) -> StateResult<()> {
        let mut cursors = self.cursors.lock().expect("checkpoint map poisoned");
        cursors.retain(|(id, _), _| id != job.as_str());
        Ok(())
    }
}
