//! Catalog HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::types::CreateMediaRequest;

/// Configuration for the catalog client.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            // Uploads are large; give them room
            timeout: Duration::from_secs(600),
        }
    }
}

impl CatalogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CATALOG_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            timeout: Duration::from_secs(
                std::env::var("CATALOG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Client for the media catalog service.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
}

impl CatalogClient {
    /// Create a new catalog client.
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CatalogError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> CatalogResult<Self> {
        Self::new(CatalogConfig::from_env())
    }

    /// Create a media entry.
    ///
    /// The catalog upserts on id, so calling this again for the same
    /// job is harmless.
    pub async fn create_media(&self, request: &CreateMediaRequest) -> CatalogResult<()> {
        let url = format!("{}/v1/media", self.config.base_url);
        debug!("Creating media entry {} at {}", request.id, url);

        let response = self.http.post(&url).json(request).send().await?;
        Self::check_status(response).await?;

        info!("Created media entry {} ({})", request.id, request.name);
        Ok(())
    }

    /// Upload one published file to a media entry.
    pub async fn upload_file(&self, media_id: &str, path: impl AsRef<Path>) -> CatalogResult<()> {
        self.upload_file_with_progress(media_id, path, || {}).await
    }

    /// Upload one published file, calling back after each body chunk.
    pub async fn upload_file_with_progress<F>(
        &self,
        media_id: &str,
        path: impl AsRef<Path>,
        on_chunk: F,
    ) -> CatalogResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        use futures_util::TryStreamExt;

        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CatalogError::FileNotFound(path.to_string_lossy().to_string()))?;

        let file = tokio::fs::File::open(path).await.map_err(|_| {
            CatalogError::FileNotFound(path.to_string_lossy().to_string())
        })?;
        let size = file.metadata().await?.len();

        let stream = ReaderStream::new(file).inspect_ok(move |_| on_chunk());
        let part = multipart::Part::stream_with_length(Body::wrap_stream(stream), size)
            .file_name(filename.clone())
            .mime_str("video/x-matroska")
            .map_err(CatalogError::Network)?;

        let form = multipart::Form::new().part("file", part);
        let url = format!("{}/v1/media/{}", self.config.base_url, media_id);

        debug!("Uploading {} ({} bytes) to {}", filename, size, url);
        let response = self.http.put(&url).multipart(form).send().await?;
        Self::check_status(response).await?;

        info!("Uploaded {} to media entry {}", filename, media_id);
        Ok(())
    }

    /// Check if the catalog is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/v1/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Catalog health check failed: {}", e);
                false
            }
        }
    }

    async fn check_status(response: reqwest::Response) -> CatalogResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CatalogClient {
        CatalogClient::new(CatalogConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .expect("build client")
    }

    #[tokio::test]
    async fn create_media_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/media"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .create_media(&CreateMediaRequest {
                name: "Example".to_string(),
                id: "job-1".to_string(),
                files: 2,
                kind: "movie".to_string(),
            })
            .await
            .expect("create media");
    }

    #[tokio::test]
    async fn upload_file_puts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/media/job-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("episode.mkv");
        tokio::fs::write(&file, b"not really matroska")
            .await
            .expect("write file");

        let client = client_for(&server);
        client.upload_file("job-1", &file).await.expect("upload");
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/media"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .create_media(&CreateMediaRequest {
                name: "Example".to_string(),
                id: "job-1".to_string(),
                files: 1,
                kind: "series".to_string(),
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/media/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("episode.mkv");
        tokio::fs::write(&file, b"bytes").await.expect("write file");

        let client = client_for(&server);
        let err = client.upload_file("missing", &file).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
