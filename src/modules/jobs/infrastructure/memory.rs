//! In-process implementation of JobRepository
//!
//! Holds every job behind one mutex, so each operation is trivially atomic
//! with respect to the others. Intended for embedding the queue without
//! PostgreSQL and for exercising the runner and scheduler in tests.

use crate::modules::jobs::domain::entities::{Job, JobRecord, JobStatus, JobType};
use crate::modules::jobs::domain::repository::{
    effective_list_limit, JobRepository, JobStatistics,
};
use crate::modules::jobs::domain::value_objects::RetryDecision;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const STALE_JOB_MESSAGE: &str = "Job abandoned by its worker and recovered";

struct StoredJob {
    /// Insertion order, breaks ties between identical `created_at` values
    seq: u64,
    record: JobRecord,
}

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    jobs: Vec<StoredJob>,
}

pub struct InMemoryJobRepository {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, job: Job, dedup_key: Option<&str>) -> AppResult<Option<JobRecord>> {
        job.validate()?;
        let now = self.clock.now();
        let mut state = self.lock();

        if let Some(key) = dedup_key {
            let duplicate = state.jobs.iter().any(|stored| {
                stored.record.job_type == job.job_type
                    && stored.record.status.is_active()
                    && stored.record.dedup_key.as_deref() == Some(key)
            });
            if duplicate {
                return Ok(None);
            }
        }

        let record = JobRecord {
            id: Uuid::new_v4(),
            job_type: job.job_type,
            payload: job.payload,
            priority: job.priority,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: job.max_retries,
            dedup_key: dedup_key.map(str::to_string),
            created_at: now,
            available_at: now,
            started_at: None,
            claimed_at: None,
            completed_at: None,
            error_message: None,
            result: None,
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.push(StoredJob {
            seq,
            record: record.clone(),
        });

        Ok(Some(record))
    }

    /// Number of stored jobs in any state
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn to_chrono(duration: Duration) -> AppResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| AppError::InvalidInput(format!("Duration out of range: {}", e)))
}

/// Apply a failed attempt to a running record, returning whether it re-queued
fn fail_attempt(
    record: &mut JobRecord,
    now: DateTime<Utc>,
    retry_at: Option<DateTime<Utc>>,
    error_message: &str,
) -> bool {
    record.error_message = Some(error_message.to_string());

    match retry_at {
        Some(available_at) if record.can_retry() => {
            record.retry_count += 1;
            record.status = JobStatus::Pending;
            record.available_at = available_at;
            record.completed_at = None;
            true
        }
        _ => {
            record.status = JobStatus::Failed;
            record.completed_at = Some(now);
            false
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn enqueue(&self, job: Job) -> AppResult<JobRecord> {
        self.insert(job, None)?
            .ok_or_else(|| AppError::InternalError("Job insert was skipped".to_string()))
    }

    async fn enqueue_unique(&self, job: Job, dedup_key: &str) -> AppResult<Option<JobRecord>> {
        self.insert(job, Some(dedup_key))
    }

    async fn find_active_by_dedup_key(
        &self,
        job_type: JobType,
        dedup_key: &str,
    ) -> AppResult<Option<JobRecord>> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .map(|stored| &stored.record)
            .find(|record| {
                record.job_type == job_type
                    && record.status.is_active()
                    && record.dedup_key.as_deref() == Some(dedup_key)
            })
            .cloned())
    }

    async fn claim_next(&self, job_types: &[JobType], limit: usize) -> AppResult<Vec<JobRecord>> {
        if job_types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut state = self.lock();

        let mut candidates: Vec<usize> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, stored)| {
                stored.record.status == JobStatus::Pending
                    && job_types.contains(&stored.record.job_type)
                    && stored.record.available_at <= now
            })
            .map(|(index, _)| index)
            .collect();

        candidates.sort_by(|&a, &b| {
            let (a, b) = (&state.jobs[a], &state.jobs[b]);
            b.record
                .priority
                .cmp(&a.record.priority)
                .then(a.record.created_at.cmp(&b.record.created_at))
                .then(a.seq.cmp(&b.seq))
        });
        candidates.truncate(limit);

        let claimed = candidates
            .into_iter()
            .map(|index| {
                let record = &mut state.jobs[index].record;
                record.status = JobStatus::Running;
                record.started_at.get_or_insert(now);
                record.claimed_at = Some(now);
                record.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn mark_completed(&self, job_id: Uuid, result: serde_json::Value) -> AppResult<bool> {
        let now = self.clock.now();
        let mut state = self.lock();

        let Some(stored) = state
            .jobs
            .iter_mut()
            .find(|stored| stored.record.id == job_id && stored.record.status == JobStatus::Running)
        else {
            return Ok(false);
        };

        stored.record.status = JobStatus::Completed;
        stored.record.completed_at = Some(now);
        stored.record.result = Some(result);
        stored.record.error_message = None;
        Ok(true)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_message: &str,
        decision: RetryDecision,
    ) -> AppResult<Option<JobRecord>> {
        let now = self.clock.now();
        let retry_at = match decision {
            RetryDecision::Retry { after } => Some(now + to_chrono(after)?),
            RetryDecision::GiveUp => None,
        };
        let mut state = self.lock();

        let Some(stored) = state
            .jobs
            .iter_mut()
            .find(|stored| stored.record.id == job_id && stored.record.status == JobStatus::Running)
        else {
            return Ok(None);
        };

        fail_attempt(&mut stored.record, now, retry_at, error_message);
        Ok(Some(stored.record.clone()))
    }

    async fn get(&self, job_id: Uuid) -> AppResult<Option<JobRecord>> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|stored| stored.record.id == job_id)
            .map(|stored| stored.record.clone()))
    }

    async fn list_recent(&self, job_type: Option<JobType>, limit: i64) -> AppResult<Vec<JobRecord>> {
        let limit = usize::try_from(effective_list_limit(limit)?).unwrap_or(usize::MAX);
        let state = self.lock();

        let mut jobs: Vec<&StoredJob> = state
            .jobs
            .iter()
            .filter(|stored| job_type.map_or(true, |t| stored.record.job_type == t))
            .collect();

        jobs.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(jobs
            .into_iter()
            .take(limit)
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn stats(&self) -> AppResult<JobStatistics> {
        let state = self.lock();
        Ok(JobStatistics::from_counts(
            state
                .jobs
                .iter()
                .map(|stored| (stored.record.job_type, stored.record.status, 1)),
        ))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let mut state = self.lock();
        let before = state.jobs.len();

        state.jobs.retain(|stored| {
            let expired = stored.record.status.is_terminal()
                && stored.record.completed_at.map_or(false, |at| at < cutoff);
            !expired
        });

        Ok(before - state.jobs.len())
    }

    async fn requeue_stale(&self, older_than: Duration, exclude: &[Uuid]) -> AppResult<Vec<JobRecord>> {
        let now = self.clock.now();
        let cutoff = now - to_chrono(older_than)?;
        let mut state = self.lock();

        let recovered = state
            .jobs
            .iter_mut()
            .filter(|stored| {
                stored.record.status == JobStatus::Running
                    && stored.record.claimed_at.map_or(false, |at| at < cutoff)
                    && !exclude.contains(&stored.record.id)
            })
            .map(|stored| {
                fail_attempt(&mut stored.record, now, Some(now), STALE_JOB_MESSAGE);
                stored.record.clone()
            })
            .collect();

        Ok(recovered)
    }
}
