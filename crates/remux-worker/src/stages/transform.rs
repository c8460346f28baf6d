//! Transform stage: transcode fetched files to Matroska.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use remux_media::{TranscodeCommand, TranscodeRunner, TranscodeSettings};
use remux_models::Stage;

use crate::error::StageError;
use crate::stage::{JobContext, Liveness, StageHandler, UnitRef};

/// Extensions treated as transcodable media.
const MEDIA_EXTS: [&str; 4] = ["mp4", "mkv", "mov", "webm"];

/// Transcodes each fetched file into the output directory.
///
/// One unit = one file; the unit key is the source file name. The
/// encoder's progress lines drive the liveness tick, so a wedged
/// FFmpeg is failed as stalled well before its total-time budget.
pub struct TransformStage {
    settings: TranscodeSettings,
    timeout: Duration,
}

impl TransformStage {
    pub fn new(settings: TranscodeSettings, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    fn is_media(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| MEDIA_EXTS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl StageHandler for TransformStage {
    fn stage(&self) -> Stage {
        Stage::Transform
    }

    async fn enumerate(&self, ctx: &JobContext) -> Result<Vec<UnitRef>, StageError> {
        let mut units = Vec::new();
        let mut entries = tokio::fs::read_dir(ctx.source_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && Self::is_media(&path) {
                units.push(UnitRef::new(entry.file_name().to_string_lossy()));
            }
        }

        Ok(units)
    }

    async fn process(
        &self,
        ctx: &JobContext,
        unit: &UnitRef,
        liveness: Arc<Liveness>,
    ) -> Result<(), StageError> {
        let input = ctx.source_dir().join(&unit.key);
        let mut output = ctx.out_dir().join(&unit.key);
        output.set_extension("mkv");

        info!(
            job_id = %ctx.job_id(),
            input = %input.display(),
            output = %output.display(),
            "Transcoding"
        );

        let cmd = TranscodeCommand::new(&input, &output, self.settings.clone());
        let runner = TranscodeRunner::new().with_timeout(self.timeout.as_secs());

        let ticker = Arc::clone(&liveness);
        runner
            .run_with_progress(&cmd, move |progress| {
                ticker.tick();
                debug!(
                    frame = progress.frame,
                    out_time_ms = progress.out_time_ms,
                    speed = progress.speed,
                    "Encoder progress"
                );
            })
            .await?;

        Ok(())
    }
}
