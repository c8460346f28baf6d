//! Inbound job payload and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::media::MediaDescriptor;

/// Unique identifier for a job.
///
/// Also the key under which checkpoints and telemetry are stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Error decoding or validating an inbound job payload.
///
/// A payload that fails here is a poison message: it is acknowledged
/// and dead-lettered, never retried.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// A "new media" job: convert everything under the source locator.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConvertJob {
    /// Unique job ID
    pub job_id: JobId,

    /// Immutable media metadata supplied by the message.
    ///
    /// Never mutated during processing.
    #[validate(nested)]
    pub media: MediaDescriptor,

    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ConvertJob {
    /// Create a new convert job.
    pub fn new(media: MediaDescriptor) -> Self {
        Self {
            job_id: JobId::new(),
            media,
            created_at: Utc::now(),
        }
    }

    /// Decode and validate a raw queue payload.
    pub fn decode(payload: &str) -> Result<Self, PayloadError> {
        let job: Self = serde_json::from_str(payload)?;
        job.validate()?;
        Ok(job)
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("convert:{}:{}", self.media.kind, self.media.source_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn descriptor() -> MediaDescriptor {
        MediaDescriptor {
            name: "The Big Lebowski".to_string(),
            kind: MediaKind::Movie,
            source_prefix: "originals/lebowski".to_string(),
        }
    }

    #[test]
    fn decode_roundtrip() {
        let job = ConvertJob::new(descriptor());
        let json = serde_json::to_string(&job).expect("serialize job");
        let decoded = ConvertJob::decode(&json).expect("decode job");
        assert_eq!(decoded.job_id, job.job_id);
        assert_eq!(decoded.media.name, "The Big Lebowski");
    }

    #[test]
    fn decode_rejects_missing_media() {
        let err = ConvertJob::decode(r#"{"job_id":"abc","created_at":"2024-01-01T00:00:00Z"}"#)
            .unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_empty_name() {
        let mut media = descriptor();
        media.name.clear();
        let json = serde_json::to_string(&ConvertJob::new(media)).expect("serialize job");
        let err = ConvertJob::decode(&json).unwrap_err();
        assert!(matches!(err, PayloadError::Invalid(_)));
    }

    #[test]
    fn idempotency_key_is_stable() {
        let a = ConvertJob::new(descriptor());
        let b = ConvertJob::new(descriptor());
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
