//! Durable per-job checkpoint store.
//!
//! Persists, per `(job, stage)`, the index of the next unit to process.
//! A restarted worker reads the cursor back and skips everything below
//! it, which is what makes broker redelivery cheap.

pub mod checkpoint;
pub mod error;
pub mod memory;

pub use checkpoint::{CheckpointStore, RedisCheckpointStore, StateConfig};
pub use error::{StateError, StateResult};
pub use memory::MemoryCheckpointStore;
