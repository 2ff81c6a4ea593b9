/// Repository trait for job persistence
///
/// Defines the interface for durable job storage and atomic claiming.
/// `JobRepositoryImpl` backs it with PostgreSQL; `InMemoryJobRepository`
/// keeps everything in process for embedding and tests.
use crate::modules::jobs::domain::entities::{Job, JobRecord, JobStatus, JobType};
use crate::modules::jobs::domain::value_objects::RetryDecision;
use crate::shared::errors::AppResult;
use crate::shared::utils::validation::Validator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Upper bound on `list_recent` page size
pub const MAX_LIST_LIMIT: i64 = 500;

/// Reject non-positive page sizes and cap large ones
pub fn effective_list_limit(limit: i64) -> AppResult<i64> {
    Validator::validate_limit(limit)?;
    Ok(limit.min(MAX_LIST_LIMIT))
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Validate and insert a new `pending` job
    async fn enqueue(&self, job: Job) -> AppResult<JobRecord>;

    /// Insert unless an active job with the same type and key exists.
    /// Returns `None` when an equivalent job is already pending or running.
    async fn enqueue_unique(&self, job: Job, dedup_key: &str) -> AppResult<Option<JobRecord>>;

    /// The pending or running job holding `dedup_key` for this type, if any
    async fn find_active_by_dedup_key(
        &self,
        job_type: JobType,
        dedup_key: &str,
    ) -> AppResult<Option<JobRecord>>;

    /// Atomically move up to `limit` claimable jobs of the given types to
    /// `running`, most urgent first, oldest first among equals.
    ///
    /// Concurrent callers never receive the same job.
    async fn claim_next(&self, job_types: &[JobType], limit: usize) -> AppResult<Vec<JobRecord>>;

    /// Mark a running job as completed. Returns false (no-op) if the job is
    /// not running, which guards against duplicate completion reports.
    async fn mark_completed(&self, job_id: Uuid, result: serde_json::Value) -> AppResult<bool>;

    /// Record a failed attempt of a running job.
    ///
    /// With `RetryDecision::Retry` and budget left, the job goes back to
    /// `pending` with `retry_count + 1`; otherwise it becomes `failed`.
    /// Returns `None` (no-op) if the job is not running.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_message: &str,
        decision: RetryDecision,
    ) -> AppResult<Option<JobRecord>>;

    /// Get job by ID
    async fn get(&self, job_id: Uuid) -> AppResult<Option<JobRecord>>;

    /// Most recently created jobs, optionally of one type
    async fn list_recent(&self, job_type: Option<JobType>, limit: i64) -> AppResult<Vec<JobRecord>>;

    /// Job counts grouped by status and type
    async fn stats(&self) -> AppResult<JobStatistics>;

    /// Delete completed/failed jobs whose `completed_at` is before `cutoff`.
    /// Pending and running jobs are never touched.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize>;

    /// Recover jobs left `running` by a dead worker: any running job claimed
    /// longer than `older_than` ago (and not in `exclude`) is re-queued, or
    /// failed if its retry budget is spent.
    async fn requeue_stale(&self, older_than: Duration, exclude: &[Uuid]) -> AppResult<Vec<JobRecord>>;
}

/// Per-status job counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Job queue statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub pending_count: i64,
    pub running_count: i64,
    pub completed_count: i64,
    pub failed_count: i64,
    pub total_count: i64,
    pub by_type: BTreeMap<JobType, StatusCounts>,
}

impl JobStatistics {
    /// Build statistics from `(type, status, count)` rows
    pub fn from_counts(rows: impl IntoIterator<Item = (JobType, JobStatus, i64)>) -> Self {
        let mut totals = StatusCounts::default();
        let mut by_type: BTreeMap<JobType, StatusCounts> = BTreeMap::new();

        for (job_type, status, count) in rows {
            totals.add(status, count);
            by_type.entry(job_type).or_default().add(status, count);
        }

        Self {
            pending_count: totals.pending,
            running_count: totals.running,
            completed_count: totals.completed,
            failed_count: totals.failed,
            total_count: totals.total(),
            by_type,
        }
    }
}
