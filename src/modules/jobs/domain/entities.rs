/// Domain entities for the background job system
///
/// Jobs represent deferred work like library scans, chapter downloads and
/// chapter update checks that are queued durably and processed by the worker pool.
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::validation::Validator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest urgency accepted by the queue
pub const PRIORITY_MIN: i32 = 1;
/// Highest urgency accepted by the queue; claimed first
pub const PRIORITY_MAX: i32 = 10;
pub const PRIORITY_DEFAULT: i32 = 5;
/// Used for automatically scheduled library scans
pub const PRIORITY_BACKGROUND: i32 = 3;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Job status enum matching database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Completed and failed jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Pending and running jobs count for duplicate avoidance
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(AppError::ValidationError(format!("Invalid job status: {}", s))),
        }
    }
}

/// Closed set of job types the queue accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    LibraryScan,
    Download,
    ChapterUpdateCheck,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::LibraryScan,
        JobType::Download,
        JobType::ChapterUpdateCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::LibraryScan => "library_scan",
            JobType::Download => "download",
            JobType::ChapterUpdateCheck => "chapter_update_check",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "library_scan" => Ok(JobType::LibraryScan),
            "download" => Ok(JobType::Download),
            "chapter_update_check" => Ok(JobType::ChapterUpdateCheck),
            _ => Err(AppError::ValidationError(format!("Invalid job type: {}", s))),
        }
    }
}

/// Kind of content a download job fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    Series,
    Chapter,
    Volume,
}

impl std::fmt::Display for DownloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadType::Series => write!(f, "series"),
            DownloadType::Chapter => write!(f, "chapter"),
            DownloadType::Volume => write!(f, "volume"),
        }
    }
}

impl std::str::FromStr for DownloadType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "series" => Ok(DownloadType::Series),
            "chapter" => Ok(DownloadType::Chapter),
            "volume" => Ok(DownloadType::Volume),
            _ => Err(AppError::ValidationError(format!(
                "Unrecognized download_type: {}",
                s
            ))),
        }
    }
}

/// Job payload for library scan jobs
///
/// `library_path_id = None` asks the handler to scan every enabled path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryScanPayload {
    #[serde(default)]
    pub library_path_id: Option<Uuid>,
}

/// Job payload for download jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadPayload {
    pub manga_id: String,
    pub download_type: DownloadType,
    #[serde(default)]
    pub series_id: Option<Uuid>,
}

/// Job payload for chapter update checks
///
/// `series_id = None` checks every tracked series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterUpdateCheckPayload {
    #[serde(default)]
    pub series_id: Option<Uuid>,
}

/// New job to be queued (before insertion to database)
#[derive(Debug, Clone)]
pub struct Job {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_retries: i32,
}

impl Job {
    /// Create a job with an arbitrary payload
    pub fn new(job_type: JobType, payload: serde_json::Value, priority: i32) -> Self {
        Self {
            job_type,
            payload,
            priority,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create a new library scan job
    pub fn library_scan(library_path_id: Option<Uuid>, priority: i32) -> Self {
        let payload = LibraryScanPayload { library_path_id };
        Self::new(JobType::LibraryScan, serde_json::json!(payload), priority)
    }

    /// Create a new download job
    pub fn download(
        manga_id: impl Into<String>,
        download_type: DownloadType,
        series_id: Option<Uuid>,
        priority: i32,
    ) -> Self {
        let payload = DownloadPayload {
            manga_id: manga_id.into(),
            download_type,
            series_id,
        };
        Self::new(JobType::Download, serde_json::json!(payload), priority)
    }

    /// Create a new chapter update check job
    pub fn chapter_update_check(series_id: Option<Uuid>, priority: i32) -> Self {
        let payload = ChapterUpdateCheckPayload { series_id };
        Self::new(
            JobType::ChapterUpdateCheck,
            serde_json::json!(payload),
            priority,
        )
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Reject jobs the store must never persist
    pub fn validate(&self) -> AppResult<()> {
        Validator::validate_priority(self.priority)?;
        Validator::validate_max_retries(self.max_retries)?;

        if !self.payload.is_object() {
            return Err(AppError::ValidationError(
                "Job payload must be a JSON object".to_string(),
            ));
        }

        if self.job_type == JobType::Download {
            let payload: DownloadPayload = serde_json::from_value(self.payload.clone())
                .map_err(|e| AppError::ValidationError(format!("Invalid download payload: {}", e)))?;
            Validator::validate_manga_id(&payload.manga_id)?;
        }

        Ok(())
    }
}

/// Job record from database (with metadata)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub dedup_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl JobRecord {
    /// Check if a failure may send the job back to the queue
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 1-based attempt number of the current (or last) execution
    pub fn attempt(&self) -> i32 {
        self.retry_count + 1
    }

    /// Decode the payload into a typed struct
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::ValidationError(format!("{} payload: {}", self.job_type, e))
        })
    }
}
