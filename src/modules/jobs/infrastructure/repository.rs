/// Diesel-based implementation of JobRepository
///
/// Uses PostgreSQL with SELECT FOR UPDATE SKIP LOCKED for atomic job claiming.
/// Every state transition is a single conditional UPDATE ... RETURNING, so
/// several runner processes can share one table safely.
use crate::modules::jobs::domain::entities::{Job, JobRecord, JobStatus, JobType};
use crate::modules::jobs::domain::repository::{
    effective_list_limit, JobRepository, JobStatistics,
};
use crate::modules::jobs::domain::value_objects::{JobStatusDb, RetryDecision};
use crate::modules::jobs::infrastructure::models::{to_job_records, BackgroundJobModel, NewJob};
use crate::schema::background_jobs;
use crate::shared::database::Database;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Bool, Double, Text};
use tokio::task;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, job_type, payload, priority, status, retry_count, max_retries, \
     dedup_key, created_at, available_at, started_at, claimed_at, completed_at, \
     error_message, result";

const STALE_JOB_MESSAGE: &str = "Job abandoned by its worker and recovered";

/// Helper struct for grouped COUNT queries
#[derive(QueryableByName)]
struct StatusCountRow {
    #[diesel(sql_type = Text)]
    job_type: String,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

pub struct JobRepositoryImpl {
    db: Arc<Database>,
}

impl JobRepositoryImpl {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run a blocking diesel operation on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || {
            let mut conn = db.get_connection()?;
            f(&mut conn)
        })
        .await?
    }
}

fn db_error(context: &str) -> impl FnOnce(diesel::result::Error) -> AppError + '_ {
    move |e| AppError::DatabaseError(format!("{}: {}", context, e))
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn enqueue(&self, job: Job) -> AppResult<JobRecord> {
        job.validate()?;
        let new_job = NewJob::from_job(job, None);

        self.with_conn(move |conn| {
            let inserted: BackgroundJobModel = diesel::insert_into(background_jobs::table)
                .values(&new_job)
                .returning(BackgroundJobModel::as_returning())
                .get_result(conn)
                .map_err(db_error("Failed to enqueue job"))?;

            inserted.to_job_record()
        })
        .await
    }

    async fn enqueue_unique(&self, job: Job, dedup_key: &str) -> AppResult<Option<JobRecord>> {
        job.validate()?;
        let new_job = NewJob::from_job(job, Some(dedup_key));

        self.with_conn(move |conn| {
            // The partial unique index on (job_type, dedup_key) over active
            // rows turns a duplicate insert into a no-op
            let inserted: Option<BackgroundJobModel> = diesel::insert_into(background_jobs::table)
                .values(&new_job)
                .on_conflict_do_nothing()
                .returning(BackgroundJobModel::as_returning())
                .get_result(conn)
                .optional()
                .map_err(db_error("Failed to enqueue unique job"))?;

            inserted.map(BackgroundJobModel::to_job_record).transpose()
        })
        .await
    }

    async fn find_active_by_dedup_key(
        &self,
        job_type: JobType,
        dedup_key: &str,
    ) -> AppResult<Option<JobRecord>> {
        let dedup_key = dedup_key.to_string();

        self.with_conn(move |conn| {
            let job: Option<BackgroundJobModel> = background_jobs::table
                .filter(background_jobs::job_type.eq(job_type.as_str()))
                .filter(background_jobs::dedup_key.eq(&dedup_key))
                .filter(
                    background_jobs::status
                        .eq_any(vec![JobStatusDb::Pending, JobStatusDb::Running]),
                )
                .select(BackgroundJobModel::as_select())
                .first(conn)
                .optional()
                .map_err(db_error("Failed to find active job by dedup key"))?;

            job.map(BackgroundJobModel::to_job_record).transpose()
        })
        .await
    }

    async fn claim_next(&self, job_types: &[JobType], limit: usize) -> AppResult<Vec<JobRecord>> {
        if job_types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let types: Vec<String> = job_types.iter().map(|t| t.as_str().to_string()).collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            // Atomic claim using SELECT FOR UPDATE SKIP LOCKED
            // Concurrent claimers skip rows another transaction has locked
            let query = format!(
                r#"
                WITH claimed AS (
                    UPDATE background_jobs
                    SET status = 'running',
                        started_at = COALESCE(started_at, NOW()),
                        claimed_at = NOW()
                    WHERE id IN (
                        SELECT id
                        FROM background_jobs
                        WHERE status = 'pending'
                          AND job_type = ANY($1)
                          AND available_at <= NOW()
                        ORDER BY priority DESC, created_at ASC, id ASC
                        LIMIT $2
                        FOR UPDATE SKIP LOCKED
                    )
                    RETURNING {columns}
                )
                SELECT {columns}
                FROM claimed
                ORDER BY priority DESC, created_at ASC, id ASC
                "#,
                columns = JOB_COLUMNS
            );

            let claimed: Vec<BackgroundJobModel> = diesel::sql_query(query)
                .bind::<Array<Text>, _>(types)
                .bind::<BigInt, _>(limit)
                .load(conn)
                .map_err(db_error("Failed to claim jobs"))?;

            to_job_records(claimed)
        })
        .await
    }

    async fn mark_completed(&self, job_id: Uuid, result: serde_json::Value) -> AppResult<bool> {
        self.with_conn(move |conn| {
            let updated = diesel::update(
                background_jobs::table
                    .filter(background_jobs::id.eq(job_id))
                    .filter(background_jobs::status.eq(JobStatusDb::Running)),
            )
            .set((
                background_jobs::status.eq(JobStatusDb::Completed),
                background_jobs::completed_at.eq(diesel::dsl::now),
                background_jobs::result.eq(Some(result)),
                background_jobs::error_message.eq(None::<String>),
            ))
            .execute(conn)
            .map_err(db_error("Failed to mark job as completed"))?;

            Ok(updated == 1)
        })
        .await
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_message: &str,
        decision: RetryDecision,
    ) -> AppResult<Option<JobRecord>> {
        let error_message = error_message.to_string();
        let will_retry = decision.will_retry();
        let delay_secs = decision.delay().as_secs_f64();

        self.with_conn(move |conn| {
            // SET expressions all see the pre-update row, so the retry
            // condition is evaluated once against the old retry_count
            let query = format!(
                r#"
                UPDATE background_jobs
                SET status = CASE
                        WHEN $2 AND retry_count < max_retries THEN 'pending'::job_status
                        ELSE 'failed'::job_status
                    END,
                    retry_count = CASE
                        WHEN $2 AND retry_count < max_retries THEN retry_count + 1
                        ELSE retry_count
                    END,
                    available_at = CASE
                        WHEN $2 AND retry_count < max_retries
                            THEN NOW() + make_interval(secs => $3)
                        ELSE available_at
                    END,
                    completed_at = CASE
                        WHEN $2 AND retry_count < max_retries THEN NULL
                        ELSE NOW()
                    END,
                    error_message = $4
                WHERE id = $1 AND status = 'running'
                RETURNING {columns}
                "#,
                columns = JOB_COLUMNS
            );

            let updated: Option<BackgroundJobModel> = diesel::sql_query(query)
                .bind::<diesel::sql_types::Uuid, _>(job_id)
                .bind::<Bool, _>(will_retry)
                .bind::<Double, _>(delay_secs)
                .bind::<Text, _>(error_message)
                .get_result(conn)
                .optional()
                .map_err(db_error("Failed to mark job as failed"))?;

            updated.map(BackgroundJobModel::to_job_record).transpose()
        })
        .await
    }

    async fn get(&self, job_id: Uuid) -> AppResult<Option<JobRecord>> {
        self.with_conn(move |conn| {
            let job: Option<BackgroundJobModel> = background_jobs::table
                .find(job_id)
                .select(BackgroundJobModel::as_select())
                .first(conn)
                .optional()
                .map_err(db_error("Failed to get job by id"))?;

            job.map(BackgroundJobModel::to_job_record).transpose()
        })
        .await
    }

    async fn list_recent(&self, job_type: Option<JobType>, limit: i64) -> AppResult<Vec<JobRecord>> {
        let limit = effective_list_limit(limit)?;

        self.with_conn(move |conn| {
            let mut query = background_jobs::table
                .select(BackgroundJobModel::as_select())
                .order((background_jobs::created_at.desc(), background_jobs::id.desc()))
                .limit(limit)
                .into_boxed();

            if let Some(job_type) = job_type {
                query = query.filter(background_jobs::job_type.eq(job_type.as_str()));
            }

            let jobs: Vec<BackgroundJobModel> = query
                .load(conn)
                .map_err(db_error("Failed to list recent jobs"))?;

            to_job_records(jobs)
        })
        .await
    }

    async fn stats(&self) -> AppResult<JobStatistics> {
        self.with_conn(|conn| {
            let rows: Vec<StatusCountRow> = diesel::sql_query(
                "SELECT job_type, status::text AS status, COUNT(*) AS count
                 FROM background_jobs
                 GROUP BY job_type, status",
            )
            .load(conn)
            .map_err(db_error("Failed to count jobs"))?;

            let counts = rows
                .into_iter()
                .map(|row| {
                    let job_type: JobType = row.job_type.parse()?;
                    let status: JobStatus = row.status.parse()?;
                    Ok((job_type, status, row.count))
                })
                .collect::<AppResult<Vec<_>>>()?;

            Ok(JobStatistics::from_counts(counts))
        })
        .await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        self.with_conn(move |conn| {
            // Single bulk DELETE; the partial index on completed_at covers it
            diesel::delete(
                background_jobs::table
                    .filter(
                        background_jobs::status
                            .eq_any(vec![JobStatusDb::Completed, JobStatusDb::Failed]),
                    )
                    .filter(background_jobs::completed_at.lt(cutoff)),
            )
            .execute(conn)
            .map_err(db_error("Failed to delete old jobs"))
        })
        .await
    }

    async fn requeue_stale(&self, older_than: Duration, exclude: &[Uuid]) -> AppResult<Vec<JobRecord>> {
        let exclude = exclude.to_vec();
        let threshold_secs = older_than.as_secs_f64();

        self.with_conn(move |conn| {
            let query = format!(
                r#"
                UPDATE background_jobs
                SET status = CASE
                        WHEN retry_count < max_retries THEN 'pending'::job_status
                        ELSE 'failed'::job_status
                    END,
                    retry_count = CASE
                        WHEN retry_count < max_retries THEN retry_count + 1
                        ELSE retry_count
                    END,
                    available_at = NOW(),
                    completed_at = CASE
                        WHEN retry_count < max_retries THEN NULL
                        ELSE NOW()
                    END,
                    error_message = $3
                WHERE status = 'running'
                  AND claimed_at < NOW() - make_interval(secs => $1)
                  AND NOT (id = ANY($2))
                RETURNING {columns}
                "#,
                columns = JOB_COLUMNS
            );

            let recovered: Vec<BackgroundJobModel> = diesel::sql_query(query)
                .bind::<Double, _>(threshold_secs)
                .bind::<Array<diesel::sql_types::Uuid>, _>(exclude)
                .bind::<Text, _>(STALE_JOB_MESSAGE)
                .load(conn)
                .map_err(db_error("Failed to requeue stale jobs"))?;

            to_job_records(recovered)
        })
        .await
    }
}
