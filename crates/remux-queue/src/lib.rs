//! Redis Streams job queue and telemetry channel.
//!
//! This crate provides:
//! - Job enqueueing with idempotency-key dedup
//! - Consumer-group consumption with ack / delayed nack / DLQ
//! - Crash recovery by claiming stale pending messages
//! - Telemetry events via Redis Pub/Sub

pub mod error;
pub mod queue;
pub mod telemetry;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
pub use telemetry::{TelemetryChannel, TelemetryEvent};
