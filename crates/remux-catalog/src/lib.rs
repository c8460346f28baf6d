//! Media catalog HTTP client.
//!
//! The catalog is the downstream service that owns published media.
//! The publish stage creates one entry per job and uploads each
//! transcoded file to it.

pub mod client;
pub mod error;
pub mod types;

pub use client::{CatalogClient, CatalogConfig};
pub use error::{CatalogError, CatalogResult};
pub use types::CreateMediaRequest;
