//! FFmpeg CLI wrapper for media transcoding.
//!
//! Builds and runs one transcode per call with progress parsed from
//! FFmpeg's `-progress` output. Used by the transform stage; one input
//! file in, one Matroska file out.

pub mod command;
pub mod error;
pub mod progress;

pub use command::{check_ffmpeg, TranscodeCommand, TranscodeRunner, TranscodeSettings};
pub use error::{MediaError, MediaResult};
pub use progress::TranscodeProgress;
