//! Pipeline stage names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One named phase of the conversion pipeline.
///
/// The order is fixed by the orchestrator, not by the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fetch source files from object storage
    Fetch,
    /// Transcode fetched files
    Transform,
    /// Upload results to the media catalog
    Publish,
}

impl Stage {
    /// The fixed pipeline order.
    pub const ORDERED: [Stage; 3] = [Stage::Fetch, Stage::Transform, Stage::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
