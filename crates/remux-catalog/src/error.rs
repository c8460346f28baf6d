//! Catalog error types.

use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Catalog returned {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Check if the error is worth retrying.
    ///
    /// Network failures and server-side errors are transient; 4xx
    /// responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Network(_) => true,
            CatalogError::RequestFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
