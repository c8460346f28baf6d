//! Catalog request types.

use serde::{Deserialize, Serialize};

/// Request body for creating a media entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMediaRequest {
    /// Display name
    pub name: String,
    /// Media id (the job id)
    pub id: String,
    /// Number of files that will be uploaded
    pub files: u32,
    /// Media kind ("movie" or "series")
    #[serde(rename = "type")]
    pub kind: String,
}
