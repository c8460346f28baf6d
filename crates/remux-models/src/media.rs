//! Media metadata models.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// What kind of media a job refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Episodic content, organized in seasons
    #[default]
    Series,
    /// A single feature
    Movie,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Series => "series",
            MediaKind::Movie => "movie",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable metadata describing the media a job operates on.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MediaDescriptor {
    /// Display name, reported to the catalog verbatim
    #[validate(length(min = 1))]
    pub name: String,

    /// Media kind
    #[serde(default)]
    pub kind: MediaKind,

    /// Object-storage prefix holding the source files
    #[validate(length(min = 1))]
    pub source_prefix: String,
}
