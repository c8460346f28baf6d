//! Coarse job status.

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Coarse job status, reported to the telemetry sink.
///
/// Expected progression is `queued → fetching → transforming →
/// publishing → done`; `errored` is terminal and reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker
    #[default]
    Queued,
    /// Fetching source files
    Fetching,
    /// Transcoding
    Transforming,
    /// Uploading results to the catalog
    Publishing,
    /// Job completed successfully
    Done,
    /// Job failed
    Errored,
}

impl JobStatus {
    /// The status reported while a given stage is running.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Fetch => JobStatus::Fetching,
            Stage::Transform => JobStatus::Transforming,
            Stage::Publish => JobStatus::Publishing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Transforming => "transforming",
            JobStatus::Publishing => "publishing",
            JobStatus::Done => "done",
            JobStatus::Errored => "errored",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Errored)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_status_mapping() {
        assert_eq!(JobStatus::for_stage(Stage::Fetch), JobStatus::Fetching);
        assert_eq!(JobStatus::for_stage(Stage::Transform), JobStatus::Transforming);
        assert_eq!(JobStatus::for_stage(Stage::Publish), JobStatus::Publishing);
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Errored.is_terminal());
        assert!(!JobStatus::Publishing.is_terminal());
    }
}
