/// Diesel models for background_jobs table
use crate::modules::jobs::domain::entities::{Job, JobRecord, JobType};
use crate::modules::jobs::domain::value_objects::JobStatusDb;
use crate::schema::background_jobs;
use crate::shared::errors::AppResult;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Diesel model for inserting new jobs
#[derive(Insertable, Debug)]
#[diesel(table_name = background_jobs)]
pub struct NewJob {
    pub job_type: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub max_retries: i32,
    pub dedup_key: Option<String>,
}

impl NewJob {
    pub fn from_job(job: Job, dedup_key: Option<&str>) -> Self {
        Self {
            job_type: job.job_type.as_str().to_string(),
            payload: job.payload,
            priority: job.priority,
            max_retries: job.max_retries,
            dedup_key: dedup_key.map(str::to_string),
        }
    }
}

/// Diesel model for querying existing jobs
#[derive(Queryable, Selectable, QueryableByName, Debug, Clone)]
#[diesel(table_name = background_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BackgroundJobModel {
    pub id: Uuid,
    pub job_type: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub status: JobStatusDb,
    pub retry_count: i32,
    pub max_retries: i32,
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<JsonValue>,
}

impl BackgroundJobModel {
    /// Convert to domain JobRecord
    ///
    /// Fails only if a row carries a job type this build does not know,
    /// which the table's CHECK constraint rules out.
    pub fn to_job_record(self) -> AppResult<JobRecord> {
        let job_type: JobType = self.job_type.parse()?;

        Ok(JobRecord {
            id: self.id,
            job_type,
            payload: self.payload,
            priority: self.priority,
            status: self.status.into(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            dedup_key: self.dedup_key,
            created_at: self.created_at,
            available_at: self.available_at,
            started_at: self.started_at,
            claimed_at: self.claimed_at,
            completed_at: self.completed_at,
            error_message: self.error_message,
            result: self.result,
        })
    }
}

/// Convert a batch of rows, failing on the first unreadable one
pub fn to_job_records(models: Vec<BackgroundJobModel>) -> AppResult<Vec<JobRecord>> {
    models
        .into_iter()
        .map(BackgroundJobModel::to_job_record)
        .collect()
}
