use crate::modules::library::domain::entities::LibraryPath;
use crate::shared::errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Read access to configured library paths, plus the scan bookkeeping
/// the scheduler writes back after a scan completes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LibraryPathRegistry: Send + Sync {
    async fn list_paths(&self) -> AppResult<Vec<LibraryPath>>;

    async fn get_path(&self, path_id: Uuid) -> AppResult<Option<LibraryPath>>;

    async fn update_last_scan(&self, path_id: Uuid, scanned_at: DateTime<Utc>) -> AppResult<()>;
}
