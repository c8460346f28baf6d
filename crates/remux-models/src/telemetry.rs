//! Telemetry message types.
//!
//! These are the payloads published per job over the telemetry channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use crate::status::JobStatus;

/// Telemetry message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryMessage {
    /// Coarse status transition
    Status {
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100), tagged with the stage that produced it
    Progress { stage: Stage, percent: u8 },

    /// Log line forwarded to the sink
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Error description for a failed job
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl TelemetryMessage {
    /// Create a status transition message.
    pub fn status(status: JobStatus) -> Self {
        Self::Status {
            status,
            timestamp: Utc::now(),
        }
    }

    /// Create a progress message. Percent is clamped to 100.
    pub fn progress(stage: Stage, percent: u8) -> Self {
        Self::Progress {
            stage,
            percent: percent.min(100),
        }
    }

    /// Create a log message.
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
