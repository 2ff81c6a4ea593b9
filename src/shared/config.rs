//! Application configuration loaded from environment variables
//!
//! Every setting except `DATABASE_URL` has a default suitable for a single
//! self-hosted instance. Call `dotenvy::dotenv()` before `AppConfig::from_env`
//! to pick up a local `.env` file.

use crate::modules::jobs::scheduler::SchedulerConfig;
use crate::modules::jobs::worker::WorkerConfig;
use crate::modules::jobs::RetryBackoff;
use crate::shared::errors::{AppError, AppResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

/// Top-level configuration for the worker binary
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    /// Terminal jobs older than this many days are removed by the daily cleanup
    pub job_retention_days: i64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let database = DatabaseConfig {
            url: validated_database_url()?,
            pool_size: parse_env("DATABASE_POOL_SIZE", 10)?,
        };

        let stale_mins: u64 = parse_env("STALE_JOB_TIMEOUT_MINS", 360)?;
        let worker = WorkerConfig {
            poll_interval: Duration::from_secs(parse_env("WORKER_POLL_INTERVAL_SECS", 5)?),
            max_concurrent_jobs: parse_env("WORKER_MAX_CONCURRENT_JOBS", 2)?,
            shutdown_timeout: Duration::from_secs(parse_env("WORKER_SHUTDOWN_TIMEOUT_SECS", 30)?),
            retry_backoff: RetryBackoff {
                base_delay: Duration::from_secs(parse_env("JOB_RETRY_BASE_DELAY_SECS", 30)?),
                max_delay: Duration::from_secs(parse_env("JOB_RETRY_MAX_DELAY_SECS", 3600)?),
                ..RetryBackoff::default()
            },
            stale_job_timeout: (stale_mins > 0).then(|| Duration::from_secs(stale_mins * 60)),
            ..WorkerConfig::default()
        };

        if worker.max_concurrent_jobs == 0 {
            return Err(AppError::ConfigurationError(
                "WORKER_MAX_CONCURRENT_JOBS must be at least 1".to_string(),
            ));
        }

        let scheduler = SchedulerConfig {
            max_retries: parse_env("JOB_MAX_RETRIES", 3)?,
            scan_check_interval: Duration::from_secs(
                parse_env::<u64>("SCAN_CHECK_INTERVAL_MINS", 15)? * 60,
            ),
            ..SchedulerConfig::default()
        };

        if scheduler.max_retries < 0 {
            return Err(AppError::ConfigurationError(
                "JOB_MAX_RETRIES cannot be negative".to_string(),
            ));
        }

        let job_retention_days: i64 = parse_env("JOB_RETENTION_DAYS", 30)?;
        if job_retention_days < 0 {
            return Err(AppError::ConfigurationError(
                "JOB_RETENTION_DAYS cannot be negative".to_string(),
            ));
        }

        Ok(Self {
            database,
            worker,
            scheduler,
            job_retention_days,
        })
    }
}

/// Validate and retrieve the database URL
fn validated_database_url() -> AppResult<String> {
    let database_url = env::var("DATABASE_URL").map_err(|_| {
        AppError::ConfigurationError("DATABASE_URL environment variable not found".to_string())
    })?;

    if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
        return Err(AppError::ConfigurationError(
            "Invalid DATABASE_URL format. Must start with postgres:// or postgresql://"
                .to_string(),
        ));
    }

    Ok(database_url)
}

fn parse_env<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigurationError(format!("Invalid {} value: {:?}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}
