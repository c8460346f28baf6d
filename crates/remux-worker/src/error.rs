//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error from one stage unit.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Storage error: {0}")]
    Storage(#[from] remux_storage::StorageError),

    #[error("Transcode error: {0}")]
    Media(#[from] remux_media::MediaError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] remux_catalog::CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stage failed: {0}")]
    Failed(String),
}

impl StageError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Check if the error is worth retrying within the same unit.
    ///
    /// Object-storage and server-side catalog failures are transient.
    /// A failed encode is deterministic and gets no in-unit retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Storage(_) => true,
            StageError::Catalog(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Top-level worker error.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] remux_queue::QueueError),

    #[error("State error: {0}")]
    State(#[from] remux_state::StateError),

    #[error("Storage error: {0}")]
    Storage(#[from] remux_storage::StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] remux_catalog::CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }
}
