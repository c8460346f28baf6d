//! S3-compatible object storage client.
//!
//! Thin wrapper over `aws-sdk-s3` used by the fetch stage to list and
//! download source objects. Works against any S3 API endpoint (MinIO,
//! R2, AWS).

pub mod client;
pub mod error;

pub use client::{ObjectInfo, ObjectStore, S3Config};
pub use error::{StorageError, StorageResult};
