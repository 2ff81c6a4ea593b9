use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tokio::task;
use uuid::Uuid;

use super::models::{LibraryPathModel, NewLibraryPath};
use crate::log_debug;
use crate::modules::library::domain::{LibraryPath, LibraryPathRegistry};
use crate::schema::library_paths;
use crate::shared::database::Database;
use crate::shared::errors::{AppError, AppResult};

pub struct LibraryPathRepositoryImpl {
    db: Arc<Database>,
}

impl LibraryPathRepositoryImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new enabled library path
    pub async fn add_path(&self, path: &str, scan_interval_hours: i32) -> AppResult<LibraryPath> {
        let path = path.trim().to_string();
        if path.is_empty() {
            return Err(AppError::ValidationError(
                "Library path cannot be empty".to_string(),
            ));
        }

        let db = Arc::clone(&self.db);
        let model = task::spawn_blocking(move || -> AppResult<LibraryPathModel> {
            let mut conn = db.get_connection()?;
            let model = diesel::insert_into(library_paths::table)
                .values(&NewLibraryPath {
                    path: &path,
                    enabled: true,
                    scan_interval_hours,
                })
                .returning(LibraryPathModel::as_returning())
                .get_result(&mut conn)?;
            Ok(model)
        })
        .await??;

        log_debug!("Registered library path {} ({})", model.path, model.id);
        Ok(model.into())
    }
}

#[async_trait]
impl LibraryPathRegistry for LibraryPathRepositoryImpl {
    async fn list_paths(&self) -> AppResult<Vec<LibraryPath>> {
        let db = Arc::clone(&self.db);
        let models = task::spawn_blocking(move || -> AppResult<Vec<LibraryPathModel>> {
            let mut conn = db.get_connection()?;
            let models = library_paths::table
                .select(LibraryPathModel::as_select())
                .order(library_paths::created_at.asc())
                .load(&mut conn)?;
            Ok(models)
        })
        .await??;

        Ok(models.into_iter().map(LibraryPath::from).collect())
    }

    async fn get_path(&self, path_id: Uuid) -> AppResult<Option<LibraryPath>> {
        let db = Arc::clone(&self.db);
        let model = task::spawn_blocking(move || -> AppResult<Option<LibraryPathModel>> {
            let mut conn = db.get_connection()?;
            let model = library_paths::table
                .find(path_id)
                .select(LibraryPathModel::as_select())
                .first(&mut conn)
                .optional()?;
            Ok(model)
        })
        .await??;

        Ok(model.map(LibraryPath::from))
    }

    async fn update_last_scan(&self, path_id: Uuid, scanned_at: DateTime<Utc>) -> AppResult<()> {
        let db = Arc::clone(&self.db);
        let updated = task::spawn_blocking(move || -> AppResult<usize> {
            let mut conn = db.get_connection()?;
            let updated = diesel::update(library_paths::table.find(path_id))
                .set(library_paths::last_scan.eq(Some(scanned_at)))
                .execute(&mut conn)?;
            Ok(updated)
        })
        .await??;

        if updated == 0 {
            return Err(AppError::NotFound(format!(
                "Library path {} not found",
                path_id
            )));
        }

        Ok(())
    }
}
