//! Media error types.

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg failed (exit code {code:?}): {message}")]
    FfmpegFailed {
        message: String,
        code: Option<i32>,
    },

    #[error("FFmpeg timed out after {0} seconds")]
    Timeout(u64),

    #[error("Output file missing after transcode: {0}")]
    OutputMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(message: impl Into<String>, code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            code,
        }
    }
}
