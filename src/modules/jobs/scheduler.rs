//! Job scheduler
//!
//! Decides what work to create: recurring library scans driven by each
//! path's scan interval, on-demand scans, downloads and chapter update
//! checks. Also the read side the API layer uses for queue inspection, and
//! retention cleanup. Execution belongs to `BackgroundWorker`.

use crate::modules::jobs::domain::entities::{
    DownloadType, Job, JobRecord, JobType, LibraryScanPayload, PRIORITY_BACKGROUND,
};
use crate::modules::jobs::domain::repository::{JobRepository, JobStatistics};
use crate::modules::jobs::handlers::library_scan::LibraryScanReport;
use crate::modules::jobs::handlers::JobEventListener;
use crate::modules::library::domain::LibraryPathRegistry;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::clock::{Clock, SystemClock};
use crate::shared::utils::validation::Validator;
use crate::{log_debug, log_error, log_info};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Retry budget given to every job this scheduler creates
    pub max_retries: i32,
    /// How often `spawn_periodic` looks for library paths due a scan
    pub scan_check_interval: Duration,
    /// Priority of automatically scheduled scans
    pub scan_priority: i32,
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            scan_check_interval: Duration::from_secs(15 * 60),
            scan_priority: PRIORITY_BACKGROUND,
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of one `schedule_library_scans` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanScheduleSummary {
    pub scheduled: usize,
    pub skipped: usize,
    pub total_paths: usize,
}

/// Duplicate-avoidance key shared by every scan of one path
pub fn library_scan_dedup_key(library_path_id: Uuid) -> String {
    format!("library_path:{}", library_path_id)
}

pub struct Scheduler {
    job_repository: Arc<dyn JobRepository>,
    library_paths: Arc<dyn LibraryPathRegistry>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        library_paths: Arc<dyn LibraryPathRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            job_repository,
            library_paths,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Queue a job by type name, as received from the API layer
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
    ) -> AppResult<Uuid> {
        let job_type: JobType = job_type.parse()?;
        let job = Job::new(job_type, payload, priority).with_max_retries(self.config.max_retries);

        let record = self.job_repository.enqueue(job).await?;
        log_info!("Queued {} job {} (priority {})", record.job_type, record.id, priority);
        Ok(record.id)
    }

    /// Queue a scan of one path, or of every enabled path when `None`.
    ///
    /// A path that already has a pending or running scan is not queued
    /// again; the id of the existing scan is returned instead.
    pub async fn schedule_manual_scan(
        &self,
        library_path_id: Option<Uuid>,
        priority: i32,
    ) -> AppResult<Uuid> {
        let Some(path_id) = library_path_id else {
            let job = Job::library_scan(None, priority).with_max_retries(self.config.max_retries);
            let record = self.job_repository.enqueue(job).await?;
            log_info!("Manual scan {} queued for all enabled paths", record.id);
            return Ok(record.id);
        };

        if self.library_paths.get_path(path_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Library path {} not found",
                path_id
            )));
        }

        let dedup_key = library_scan_dedup_key(path_id);

        // The active scan can finish between the insert and the lookup
        for _ in 0..2 {
            let job = Job::library_scan(Some(path_id), priority)
                .with_max_retries(self.config.max_retries);

            if let Some(record) = self.job_repository.enqueue_unique(job, &dedup_key).await? {
                log_info!("Manual scan {} queued for path {}", record.id, path_id);
                return Ok(record.id);
            }

            if let Some(existing) = self
                .job_repository
                .find_active_by_dedup_key(JobType::LibraryScan, &dedup_key)
                .await?
            {
                log_info!(
                    "Scan {} already {} for path {}, not queuing another",
                    existing.id,
                    existing.status,
                    path_id
                );
                return Ok(existing.id);
            }
        }

        Err(AppError::ServiceUnavailable(format!(
            "Could not queue scan for library path {}",
            path_id
        )))
    }

    /// Queue a scan for every path whose interval has elapsed.
    ///
    /// Paths that are not due, or already have a pending/running scan, are
    /// counted as skipped.
    pub async fn schedule_library_scans(&self) -> AppResult<ScanScheduleSummary> {
        let now = self.clock.now();
        let paths = self.library_paths.list_paths().await?;

        let mut summary = ScanScheduleSummary {
            total_paths: paths.len(),
            ..ScanScheduleSummary::default()
        };

        for path in &paths {
            if !path.is_due_for_scan(now) {
                summary.skipped += 1;
                continue;
            }

            let job = Job::library_scan(Some(path.id), self.config.scan_priority)
                .with_max_retries(self.config.max_retries);

            match self
                .job_repository
                .enqueue_unique(job, &library_scan_dedup_key(path.id))
                .await?
            {
                Some(record) => {
                    log_info!("Scheduled library scan {} for {}", record.id, path.path);
                    summary.scheduled += 1;
                }
                None => {
                    log_debug!("Scan for {} already queued, skipping", path.path);
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    pub async fn schedule_download(
        &self,
        manga_id: &str,
        download_type: &str,
        series_id: Option<Uuid>,
        priority: i32,
    ) -> AppResult<Uuid> {
        Validator::validate_manga_id(manga_id)?;
        let download_type: DownloadType = download_type.parse()?;

        let job = Job::download(manga_id.trim(), download_type, series_id, priority)
            .with_max_retries(self.config.max_retries);
        let record = self.job_repository.enqueue(job).await?;

        log_info!(
            "Queued {} download {} for manga {}",
            download_type,
            record.id,
            manga_id
        );
        Ok(record.id)
    }

    pub async fn schedule_chapter_update_check(
        &self,
        series_id: Option<Uuid>,
        priority: i32,
    ) -> AppResult<Uuid> {
        let job = Job::chapter_update_check(series_id, priority)
            .with_max_retries(self.config.max_retries);
        let record = self.job_repository.enqueue(job).await?;

        log_info!("Queued chapter update check {}", record.id);
        Ok(record.id)
    }

    pub async fn get_queue_stats(&self) -> AppResult<JobStatistics> {
        self.job_repository.stats().await
    }

    pub async fn get_recent_jobs(
        &self,
        job_type: Option<JobType>,
        limit: i64,
    ) -> AppResult<Vec<JobRecord>> {
        self.job_repository.list_recent(job_type, limit).await
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> AppResult<JobRecord> {
        self.job_repository
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }

    /// Delete completed and failed jobs older than `older_than_days`
    pub async fn cleanup_old_jobs(&self, older_than_days: i64) -> AppResult<usize> {
        Validator::validate_retention_days(older_than_days)?;

        let cutoff = self.clock.now() - chrono::Duration::days(older_than_days);
        let deleted = self.job_repository.delete_older_than(cutoff).await?;

        log_info!(
            "Cleaned up {} jobs finished more than {} days ago",
            deleted,
            older_than_days
        );
        Ok(deleted)
    }

    /// Run automatic scan scheduling and daily cleanup until `cancel` fires
    pub fn spawn_periodic(
        self: &Arc<Self>,
        check_interval: Duration,
        retention_days: i64,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let mut scan_tick = tokio::time::interval(check_interval.max(Duration::from_secs(1)));
            scan_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cleanup_tick =
                tokio::time::interval(scheduler.config.cleanup_interval.max(Duration::from_secs(1)));
            cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log_info!("Periodic scheduler started (scan check every {:?})", check_interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = scan_tick.tick() => {
                        match scheduler.schedule_library_scans().await {
                            Ok(summary) if summary.scheduled > 0 => log_info!(
                                "Scheduled {} library scans ({} skipped of {})",
                                summary.scheduled,
                                summary.skipped,
                                summary.total_paths
                            ),
                            Ok(_) => log_debug!("No library paths due for scanning"),
                            Err(e) => log_error!("Automatic scan scheduling failed: {}", e),
                        }
                    }
                    _ = cleanup_tick.tick() => {
                        if let Err(e) = scheduler.cleanup_old_jobs(retention_days).await {
                            log_error!("Job cleanup failed: {}", e);
                        }
                    }
                }
            }

            log_info!("Periodic scheduler stopped");
        })
    }
}

#[async_trait]
impl JobEventListener for Scheduler {
    /// Record scan completion on the paths the job actually scanned
    async fn on_job_completed(&self, job: &JobRecord, result: &serde_json::Value) -> AppResult<()> {
        if job.job_type != JobType::LibraryScan {
            return Ok(());
        }

        let payload: LibraryScanPayload = job.parse_payload()?;
        let scanned_at = self.clock.now();

        let scanned: Vec<Uuid> = match payload.library_path_id {
            Some(path_id) => vec![path_id],
            None => LibraryScanReport::scanned_path_ids(result),
        };

        for path_id in scanned {
            self.library_paths.update_last_scan(path_id, scanned_at).await?;
        }

        Ok(())
    }
}
