//! Publish stage: upload transcoded files to the media catalog.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use remux_catalog::{CatalogClient, CreateMediaRequest};
use remux_models::Stage;

use crate::error::StageError;
use crate::stage::{JobContext, Liveness, StageHandler, UnitRef};

/// Uploads each output file to the catalog.
///
/// The media entry is created once per job before the first upload; the
/// catalog upserts on id, so a redelivered job recreating it is
/// harmless. One unit = one file upload.
pub struct PublishStage {
    catalog: CatalogClient,
    entry_created: OnceCell<()>,
}

impl PublishStage {
    pub fn new(catalog: CatalogClient) -> Self {
        Self {
            catalog,
            entry_created: OnceCell::new(),
        }
    }

    async fn ensure_entry(&self, ctx: &JobContext) -> Result<(), StageError> {
        self.entry_created
            .get_or_try_init(|| async {
                let mut files = 0u32;
                let mut entries = tokio::fs::read_dir(ctx.out_dir()).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if entry.path().is_file() {
                        files += 1;
                    }
                }

                self.catalog
                    .create_media(&CreateMediaRequest {
                        name: ctx.job.media.name.clone(),
                        id: ctx.job_id().to_string(),
                        files,
                        kind: ctx.job.media.kind.to_string(),
                    })
                    .await?;

                Ok::<(), StageError>(())
            })
            .await?;

        Ok(())
    }
}

#[async_trait]
impl StageHandler for PublishStage {
    fn stage(&self) -> Stage {
        Stage::Publish
    }

    async fn enumerate(&self, ctx: &JobContext) -> Result<Vec<UnitRef>, StageError> {
        let mut units = Vec::new();
        let mut entries = tokio::fs::read_dir(ctx.out_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.path().is_file() {
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
        self.ensure_entry(ctx).await?;
        liveness.tick();

        let path = ctx.out_dir().join(&unit.key);
        info!(job_id = %ctx.job_id(), file = %unit.key, "Publishing");

        let ticker = Arc::clone(&liveness);
        self.catalog
            .upload_file_with_progress(ctx.job_id().as_str(), &path, move || ticker.tick())
            .await?;

        Ok(())
    }
}
