use async_trait::async_trait;
use std::sync::Arc;

use super::{JobContext, JobHandler};
use crate::log_info;
use crate::modules::jobs::domain::entities::DownloadPayload;
use crate::modules::library::domain::DownloadService;
use crate::shared::errors::AppResult;
use crate::shared::utils::validation::Validator;

/// Runs `download` jobs through a `DownloadService`
pub struct DownloadHandler {
    service: Arc<dyn DownloadService>,
}

impl DownloadHandler {
    pub fn new(service: Arc<dyn DownloadService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for DownloadHandler {
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value> {
        let payload: DownloadPayload = ctx.parse_payload()?;
        Validator::validate_manga_id(&payload.manga_id)?;

        let report = self
            .service
            .download(&payload.manga_id, payload.download_type, payload.series_id)
            .await?;

        log_info!(
            "Download job {} ({} {}) fetched {} files",
            ctx.job_id,
            payload.download_type,
            payload.manga_id,
            report.files_downloaded
        );

        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::domain::entities::{DownloadType, JobType};
    use crate::modules::library::domain::DownloadReport;
    use crate::shared::errors::AppError;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingDownloads {
        calls: Mutex<Vec<(String, DownloadType)>>,
    }

    #[async_trait]
    impl DownloadService for RecordingDownloads {
        async fn download(
            &self,
            manga_id: &str,
            download_type: DownloadType,
            _series_id: Option<Uuid>,
        ) -> AppResult<DownloadReport> {
            self.calls
                .lock()
                .unwrap()
                .push((manga_id.to_string(), download_type));
            Ok(DownloadReport {
                files_downloaded: 12,
                bytes_downloaded: 4096,
            })
        }
    }

    fn ctx(payload: serde_json::Value) -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            job_type: JobType::Download,
            payload,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_passes_payload_to_service() {
        let service = Arc::new(RecordingDownloads::default());
        let handler = DownloadHandler::new(service.clone());

        let result = handler
            .handle(&ctx(serde_json::json!({
                "manga_id": "md-123",
                "download_type": "volume"
            })))
            .await
            .unwrap();

        assert_eq!(result["files_downloaded"], 12);
        assert_eq!(
            *service.calls.lock().unwrap(),
            vec![("md-123".to_string(), DownloadType::Volume)]
        );
    }

    #[tokio::test]
    async fn test_rejects_blank_manga_id_without_calling_service() {
        let service = Arc::new(RecordingDownloads::default());
        let handler = DownloadHandler::new(service.clone());

        let err = handler
            .handle(&ctx(serde_json::json!({
                "manga_id": "  ",
                "download_type": "series"
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(service.calls.lock().unwrap().is_empty());
    }
}
