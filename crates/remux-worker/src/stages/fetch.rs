//! Fetch stage: download source objects into the work directory.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use remux_models::Stage;
use remux_storage::ObjectStore;

use crate::error::StageError;
use crate::stage::{JobContext, Liveness, StageHandler, UnitRef};

/// Downloads everything under the job's source prefix.
///
/// One unit = one object; the unit key is the object key.
pub struct FetchStage {
    store: ObjectStore,
}

impl FetchStage {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    fn file_name(key: &str) -> &str {
        key.rsplit('/').next().unwrap_or(key)
    }
}

#[async_trait]
impl StageHandler for FetchStage {
    fn stage(&self) -> Stage {
        Stage::Fetch
    }

    async fn enumerate(&self, ctx: &JobContext) -> Result<Vec<UnitRef>, StageError> {
        let objects = self
            .store
            .list_objects(&ctx.job.media.source_prefix)
            .await?;

        Ok(objects
            .into_iter()
            .filter(|o| !o.key.ends_with('/') && o.size > 0)
            .map(|o| UnitRef::new(o.key))
            .collect())
    }

    async fn process(
        &self,
        ctx: &JobContext,
        unit: &UnitRef,
        liveness: Arc<Liveness>,
    ) -> Result<(), StageError> {
        let dest = ctx.source_dir().join(Self::file_name(&unit.key));

        info!(job_id = %ctx.job_id(), key = %unit.key, "Fetching source object");
        self.store
            .download_file_with_progress(&unit.key, &dest, |_| liveness.tick())
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_prefix() {
        assert_eq!(
            FetchStage::file_name("originals/show/Season 1/e01.mkv"),
            "e01.mkv"
        );
        assert_eq!(FetchStage::file_name("plain.mkv"), "plain.mkv");
    }
}
