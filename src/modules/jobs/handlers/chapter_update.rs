use async_trait::async_trait;
use std::sync::Arc;

use super::{JobContext, JobHandler};
use crate::log_info;
use crate::modules::jobs::domain::entities::ChapterUpdateCheckPayload;
use crate::modules::library::domain::ChapterUpdateService;
use crate::shared::errors::AppResult;

/// Runs `chapter_update_check` jobs through a `ChapterUpdateService`
pub struct ChapterUpdateCheckHandler {
    service: Arc<dyn ChapterUpdateService>,
}

impl ChapterUpdateCheckHandler {
    pub fn new(service: Arc<dyn ChapterUpdateService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ChapterUpdateCheckHandler {
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value> {
        let payload: ChapterUpdateCheckPayload = ctx.parse_payload()?;
        let report = self.service.check_for_updates(payload.series_id).await?;

        log_info!(
            "Chapter update check {} found {} new chapters across {} series",
            ctx.job_id,
            report.new_chapters,
            report.series_checked
        );

        Ok(serde_json::to_value(report)?)
    }
}
