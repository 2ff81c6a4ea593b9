use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use uuid::Uuid;

use crate::modules::library::domain::{LibraryPath, LibraryPathRegistry};
use crate::shared::errors::{AppError, AppResult};

/// Library path registry held in memory
#[derive(Debug, Default)]
pub struct InMemoryLibraryPathRegistry {
    paths: RwLock<Vec<LibraryPath>>,
}

impl InMemoryLibraryPathRegistry {
    pub fn new(paths: Vec<LibraryPath>) -> Self {
        Self {
            paths: RwLock::new(paths),
        }
    }

    pub fn add(&self, path: LibraryPath) {
        self.paths
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path);
    }

    fn read(&self) -> Vec<LibraryPath> {
        self.paths
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LibraryPathRegistry for InMemoryLibraryPathRegistry {
    async fn list_paths(&self) -> AppResult<Vec<LibraryPath>> {
        Ok(self.read())
    }

    async fn get_path(&self, path_id: Uuid) -> AppResult<Option<LibraryPath>> {
        Ok(self.read().into_iter().find(|path| path.id == path_id))
    }

    async fn update_last_scan(&self, path_id: Uuid, scanned_at: DateTime<Utc>) -> AppResult<()> {
        let mut paths = self
            .paths
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = paths
            .iter_mut()
            .find(|path| path.id == path_id)
            .ok_or_else(|| AppError::NotFound(format!("Library path {} not found", path_id)))?;

        path.last_scan = Some(scanned_at);
        Ok(())
    }
}
