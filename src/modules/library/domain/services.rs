use crate::modules::jobs::domain::entities::DownloadType;
use crate::modules::library::domain::entities::{
    DownloadReport, LibraryPath, ScanStats, UpdateCheckReport,
};
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Port for the service that imports series and chapters from disk
#[async_trait]
pub trait LibraryImporter: Send + Sync {
    async fn scan_path(&self, path: &LibraryPath) -> AppResult<ScanStats>;
}

/// Port for the service that fetches content from a remote source
#[async_trait]
pub trait DownloadService: Send + Sync {
    async fn download(
        &self,
        manga_id: &str,
        download_type: DownloadType,
        series_id: Option<Uuid>,
    ) -> AppResult<DownloadReport>;
}

/// Port for the service that looks for newly published chapters
#[async_trait]
pub trait ChapterUpdateService: Send + Sync {
    /// `None` checks every tracked series
    async fn check_for_updates(&self, series_id: Option<Uuid>) -> AppResult<UpdateCheckReport>;
}
