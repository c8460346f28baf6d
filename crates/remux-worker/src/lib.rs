//! Media conversion worker.
//!
//! This crate provides:
//! - The pipeline orchestrator (fetch → transform → publish)
//! - Per-unit checkpointing and resume
//! - Queue consumption with ack/nack and bounded retries
//! - Progress and status emission
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod stage;
pub mod stages;

pub use config::WorkerConfig;
pub use error::{StageError, WorkerError, WorkerResult};
pub use executor::{JobExecutor, ProcessingContext};
pub use logging::JobLogger;
pub use pipeline::{Pipeline, PipelineCause, PipelineError, StatusSink};
pub use stage::{JobContext, Liveness, StageHandler, UnitRef};
