//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, TranscodeProgress};

/// Encoder settings applied to every transcode.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    /// Video codec (e.g., "libx264", "h264_nvenc")
    pub video_codec: String,
    /// Encoding preset (e.g., "fast", "medium", "slow")
    pub preset: String,
    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,
    /// Audio codec
    pub audio_codec: String,
    /// Audio bitrate
    pub audio_bitrate: String,
    /// Additional FFmpeg output arguments
    pub extra_args: Vec<String>,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            audio_codec: "aac".to_string(),
            audio_bitrate: "160k".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl TranscodeSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            video_codec: std::env::var("TRANSCODE_VIDEO_CODEC").unwrap_or(defaults.video_codec),
            preset: std::env::var("TRANSCODE_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("TRANSCODE_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            audio_codec: std::env::var("TRANSCODE_AUDIO_CODEC").unwrap_or(defaults.audio_codec),
            audio_bitrate: std::env::var("TRANSCODE_AUDIO_BITRATE")
                .unwrap_or(defaults.audio_bitrate),
            extra_args: Vec::new(),
        }
    }
}

/// Builder for one FFmpeg transcode invocation.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    input: PathBuf,
    output: PathBuf,
    settings: TranscodeSettings,
}

impl TranscodeCommand {
    /// Create a new transcode command.
    pub fn new(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        settings: TranscodeSettings,
    ) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            settings,
        }
    }

    /// Output path for this command.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Progress output to stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().to_string(),
            // Carry all video/audio/subtitle streams into the container
            "-map".to_string(),
            "0".to_string(),
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-crf".to_string(),
            self.settings.crf.to_string(),
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-b:a".to_string(),
            self.settings.audio_bitrate.clone(),
            "-c:s".to_string(),
            "copy".to_string(),
        ];

        args.extend(self.settings.extra_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Runner for FFmpeg commands with progress tracking.
#[derive(Debug, Default)]
pub struct TranscodeRunner {
    /// Total-time budget for the encode, in seconds
    timeout_secs: Option<u64>,
}

impl TranscodeRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-process timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run a transcode with a progress callback.
    ///
    /// The callback fires once per FFmpeg progress block, roughly every
    /// half second while the encoder is making progress.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &TranscodeCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(TranscodeProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        if let Some(parent) = cmd.output().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let mut reader = BufReader::new(stderr).lines();

        let progress_handle = tokio::spawn(async move {
            let mut current = TranscodeProgress::default();
            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(snapshot) = parse_progress_line(&line, &mut current) {
                    progress_callback(snapshot);
                }
            }
        });

        let result = self.wait_for_completion(&mut child).await;
        let _ = progress_handle.await;
        result?;

        // FFmpeg can exit zero without producing output on some muxer errors
        if !tokio::fs::try_exists(cmd.output()).await.unwrap_or(false) {
            return Err(MediaError::OutputMissing(
                cmd.output().to_string_lossy().to_string(),
            ));
        }

        Ok(())
    }

    /// Run a transcode, ignoring progress.
    pub async fn run(&self, cmd: &TranscodeCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let status = if let Some(timeout_secs) = self.timeout_secs {
            match tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                child.wait(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            child.wait().await?
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_args() {
        let cmd = TranscodeCommand::new(
            "in.avi",
            "out.mkv",
            TranscodeSettings {
                video_codec: "libx265".to_string(),
                crf: 18,
                ..Default::default()
            },
        );

        let args = cmd.build_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx265".to_string()));
        assert!(args.contains(&"18".to_string()));
        // All streams mapped, subtitles copied
        assert!(args.contains(&"-map".to_string()));
        assert!(args.contains(&"-c:s".to_string()));
        assert_eq!(args.last().unwrap(), "out.mkv");
    }

    #[test]
    fn settings_env_defaults() {
        let settings = TranscodeSettings::default();
        assert_eq!(settings.video_codec, "libx264");
        assert_eq!(settings.crf, 20);
    }
}
