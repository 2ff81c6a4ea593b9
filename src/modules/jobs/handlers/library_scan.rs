use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{JobContext, JobHandler};
use crate::modules::jobs::domain::entities::LibraryScanPayload;
use crate::modules::library::domain::{LibraryImporter, LibraryPath, LibraryPathRegistry, ScanStats};
use crate::shared::errors::{AppError, AppResult};
use crate::{log_info, log_warn};

/// Result stored on a completed library scan job
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryScanReport {
    pub paths_scanned: usize,
    /// Paths whose import succeeded; failed ones are listed in `errors`
    #[serde(default)]
    pub scanned_path_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub stats: ScanStats,
}

impl LibraryScanReport {
    fn single(path_id: Uuid, stats: ScanStats) -> Self {
        Self {
            paths_scanned: 1,
            scanned_path_ids: vec![path_id],
            stats,
        }
    }

    /// Ids of the successfully scanned paths in a stored job result
    pub fn scanned_path_ids(result: &serde_json::Value) -> Vec<Uuid> {
        serde_json::from_value::<Self>(result.clone())
            .map(|report| report.scanned_path_ids)
            .unwrap_or_default()
    }
}

/// Runs `library_scan` jobs through a `LibraryImporter`
pub struct LibraryScanHandler {
    paths: Arc<dyn LibraryPathRegistry>,
    importer: Arc<dyn LibraryImporter>,
}

impl LibraryScanHandler {
    pub fn new(paths: Arc<dyn LibraryPathRegistry>, importer: Arc<dyn LibraryImporter>) -> Self {
        Self { paths, importer }
    }

    /// Scan every enabled path. Per-path failures are recorded in the report;
    /// the job only fails when no path could be scanned at all.
    async fn scan_all(&self) -> AppResult<LibraryScanReport> {
        let paths: Vec<LibraryPath> = self
            .paths
            .list_paths()
            .await?
            .into_iter()
            .filter(|path| path.enabled)
            .collect();

        let mut report = LibraryScanReport::default();
        let mut last_error = None;

        for path in &paths {
            match self.importer.scan_path(path).await {
                Ok(stats) => {
                    report.paths_scanned += 1;
                    report.scanned_path_ids.push(path.id);
                    report.stats.merge(stats);
                }
                Err(e) => {
                    log_warn!("Scan of library path {} failed: {}", path.path, e);
                    report.stats.errors.push(path.path.clone());
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if report.paths_scanned == 0 => Err(e),
            _ => Ok(report),
        }
    }
}

#[async_trait]
impl JobHandler for LibraryScanHandler {
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value> {
        let payload: LibraryScanPayload = ctx.parse_payload()?;

        let report = match payload.library_path_id {
            Some(path_id) => {
                let path = self.paths.get_path(path_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!("Library path {} not found", path_id))
                })?;

                let stats = self.importer.scan_path(&path).await?;
                LibraryScanReport::single(path.id, stats)
            }
            None => self.scan_all().await?,
        };

        log_info!(
            "Library scan job {} finished: {} paths, {} series, {} chapters",
            ctx.job_id,
            report.paths_scanned,
            report.stats.series_found,
            report.stats.chapters_found
        );

        Ok(serde_json::to_value(report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::domain::entities::JobType;
    use crate::modules::library::domain::repository::MockLibraryPathRegistry;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Importer returning canned results per path
    struct CannedImporter {
        results: HashMap<String, Result<ScanStats, AppError>>,
    }

    #[async_trait]
    impl LibraryImporter for CannedImporter {
        async fn scan_path(&self, path: &LibraryPath) -> AppResult<ScanStats> {
            self.results
                .get(&path.path)
                .cloned()
                .unwrap_or_else(|| Err(AppError::NotFound(path.path.clone())))
        }
    }

    fn library(path: &str, enabled: bool) -> LibraryPath {
        LibraryPath {
            id: Uuid::new_v4(),
            path: path.to_string(),
            enabled,
            scan_interval_hours: 24,
            last_scan: None,
        }
    }

    fn stats(series: usize, chapters: usize) -> ScanStats {
        ScanStats {
            series_found: series,
            chapters_found: chapters,
            errors: Vec::new(),
        }
    }

    fn ctx(library_path_id: Option<Uuid>) -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            job_type: JobType::LibraryScan,
            payload: serde_json::json!({ "library_path_id": library_path_id }),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_scans_single_path() {
        let target = library("/srv/manga", true);
        let target_id = target.id;

        let mut registry = MockLibraryPathRegistry::new();
        registry
            .expect_get_path()
            .withf(move |id| *id == target_id)
            .returning(move |_| Ok(Some(target.clone())));

        let importer = CannedImporter {
            results: HashMap::from([("/srv/manga".to_string(), Ok(stats(3, 40)))]),
        };

        let handler = LibraryScanHandler::new(Arc::new(registry), Arc::new(importer));
        let result = handler.handle(&ctx(Some(target_id))).await.unwrap();

        assert_eq!(result["paths_scanned"], 1);
        assert_eq!(result["scanned_path_ids"], serde_json::json!([target_id]));
        assert_eq!(result["series_found"], 3);
        assert_eq!(result["chapters_found"], 40);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let mut registry = MockLibraryPathRegistry::new();
        registry.expect_get_path().returning(|_| Ok(None));

        let importer = CannedImporter {
            results: HashMap::new(),
        };

        let handler = LibraryScanHandler::new(Arc::new(registry), Arc::new(importer));
        let err = handler.handle(&ctx(Some(Uuid::new_v4()))).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scan_all_skips_disabled_and_collects_failures() {
        let mut registry = MockLibraryPathRegistry::new();
        let a = library("/srv/a", true);
        let a_id = a.id;
        let listed = vec![a, library("/srv/b", true), library("/srv/disabled", false)];
        registry
            .expect_list_paths()
            .returning(move || Ok(listed.clone()));

        let importer = CannedImporter {
            results: HashMap::from([
                ("/srv/a".to_string(), Ok(stats(2, 5))),
                ("/srv/disabled".to_string(), Ok(stats(100, 100))),
            ]),
        };

        let handler = LibraryScanHandler::new(Arc::new(registry), Arc::new(importer));
        let result = handler.handle(&ctx(None)).await.unwrap();

        assert_eq!(result["paths_scanned"], 1);
        assert_eq!(result["series_found"], 2);
        assert_eq!(result["errors"], serde_json::json!(["/srv/b"]));
        assert_eq!(LibraryScanReport::scanned_path_ids(&result), vec![a_id]);
    }

    #[test]
    fn test_scanned_path_ids_of_unrelated_result_is_empty() {
        assert!(LibraryScanReport::scanned_path_ids(&serde_json::json!({})).is_empty());
        assert!(LibraryScanReport::scanned_path_ids(&serde_json::json!("done")).is_empty());
    }

    #[tokio::test]
    async fn test_scan_all_fails_when_every_path_fails() {
        let mut registry = MockLibraryPathRegistry::new();
        registry
            .expect_list_paths()
            .returning(|| Ok(vec![library("/srv/a", true)]));

        let importer = CannedImporter {
            results: HashMap::new(),
        };

        let handler = LibraryScanHandler::new(Arc::new(registry), Arc::new(importer));
        assert!(handler.handle(&ctx(None)).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let registry = MockLibraryPathRegistry::new();
        let importer = CannedImporter {
            results: HashMap::new(),
        };
        let handler = LibraryScanHandler::new(Arc::new(registry), Arc::new(importer));

        let mut bad = ctx(None);
        bad.payload = serde_json::json!({ "library_path_id": "not-a-uuid" });

        let err = handler.handle(&bad).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
