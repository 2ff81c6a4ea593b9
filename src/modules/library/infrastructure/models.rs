/// Diesel models for library_paths table
use crate::modules::library::domain::entities::LibraryPath;
use crate::schema::library_paths;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Insertable, Debug)]
#[diesel(table_name = library_paths)]
pub struct NewLibraryPath<'a> {
    pub path: &'a str,
    pub enabled: bool,
    pub scan_interval_hours: i32,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = library_paths)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LibraryPathModel {
    pub id: Uuid,
    pub path: String,
    pub enabled: bool,
    pub scan_interval_hours: i32,
    pub last_scan: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<LibraryPathModel> for LibraryPath {
    fn from(model: LibraryPathModel) -> Self {
        LibraryPath {
            id: model.id,
            path: model.path,
            enabled: model.enabled,
            scan_interval_hours: model.scan_interval_hours,
            last_scan: model.last_scan,
        }
    }
}
