//! Shared data models for the remux worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job ids and inbound job payloads
//! - Media descriptors (name, kind, source locator)
//! - Pipeline stages and coarse job status
//! - Telemetry message schemas

pub mod job;
pub mod media;
pub mod stage;
pub mod status;
pub mod telemetry;

// Re-export common types
pub use job::{ConvertJob, JobId, PayloadError};
pub use media::{MediaDescriptor, MediaKind};
pub use stage::Stage;
pub use status::JobStatus;
pub use telemetry::TelemetryMessage;
