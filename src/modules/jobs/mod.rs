/// Background job system module
///
/// Durable PostgreSQL-backed queue for library maintenance work:
/// - Library scans (recurring per path, or on demand)
/// - Downloads from external sources
/// - Chapter update checks
///
/// Architecture:
/// - Domain: Entities, retry policy and repository trait
/// - Infrastructure: Diesel repository plus an in-memory store
/// - Handlers: One executor per job type
/// - Scheduler: Decides what to enqueue and when
/// - Worker: Claims jobs and runs them with bounded concurrency
pub mod domain;
pub mod handlers;
pub mod infrastructure;
pub mod scheduler;
pub mod worker;

// Re-exports for easy access
pub use domain::{
    entities::{
        ChapterUpdateCheckPayload, DownloadPayload, DownloadType, Job, JobRecord, JobStatus,
        JobType, LibraryScanPayload, DEFAULT_MAX_RETRIES, PRIORITY_BACKGROUND, PRIORITY_DEFAULT,
        PRIORITY_MAX, PRIORITY_MIN,
    },
    repository::{JobRepository, JobStatistics, StatusCounts},
    value_objects::{RetryBackoff, RetryDecision},
};
pub use handlers::{HandlerRegistry, JobContext, JobEventListener, JobHandler};
pub use infrastructure::{InMemoryJobRepository, JobRepositoryImpl};
pub use scheduler::{ScanScheduleSummary, Scheduler, SchedulerConfig};
pub use worker::{BackgroundWorker, WorkerConfig, WorkerStatus};
