//! Job handler seam
//!
//! The runner dispatches each claimed job to the handler registered for its
//! type. Handlers know nothing about claiming, retries or concurrency; adding
//! a job type means registering one more handler.

pub mod chapter_update;
pub mod download;
pub mod library_scan;

use crate::modules::jobs::domain::entities::{JobRecord, JobType};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub use chapter_update::ChapterUpdateCheckHandler;
pub use download::DownloadHandler;
pub use library_scan::LibraryScanHandler;

/// What a handler gets to see of the job it runs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    /// 1-based attempt number
    pub attempt: i32,
}

impl JobContext {
    pub fn from_record(job: &JobRecord) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            payload: job.payload.clone(),
            attempt: job.attempt(),
        }
    }

    /// Decode the payload; a malformed payload is a permanent failure
    pub fn parse_payload<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::ValidationError(format!("{} payload: {}", self.job_type, e))
        })
    }
}

/// Executes one job type
///
/// Returning `Err` fails the attempt; `AppError::is_retryable` decides
/// whether the job goes back to the queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value>;
}

/// Observer of terminal and retry outcomes, notified after the store write
#[async_trait]
pub trait JobEventListener: Send + Sync {
    async fn on_job_completed(&self, _job: &JobRecord, _result: &serde_json::Value) -> AppResult<()> {
        Ok(())
    }

    /// `job` is the record as stored after the failure was recorded
    async fn on_job_failed(&self, _job: &JobRecord) -> AppResult<()> {
        Ok(())
    }
}

/// Maps each job type to its handler
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(job_type, handler);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Registered job types in a stable order
    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl JobHandler for Fixed {
        async fn handle(&self, _ctx: &JobContext) -> AppResult<serde_json::Value> {
            Ok(serde_json::json!({ "handler": self.0 }))
        }
    }

    fn ctx(job_type: JobType, payload: serde_json::Value) -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            job_type,
            payload,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_register_replaces_previous_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(JobType::Download, Arc::new(Fixed("first")))
            .register(JobType::Download, Arc::new(Fixed("second")));

        let handler = registry.get(JobType::Download).unwrap();
        let result = handler
            .handle(&ctx(JobType::Download, serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(result["handler"], "second");
        assert_eq!(registry.job_types(), vec![JobType::Download]);
        assert!(registry.get(JobType::LibraryScan).is_none());
    }

    #[test]
    fn test_job_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register(JobType::ChapterUpdateCheck, Arc::new(Fixed("c")));
        registry.register(JobType::LibraryScan, Arc::new(Fixed("l")));

        assert_eq!(
            registry.job_types(),
            vec![JobType::LibraryScan, JobType::ChapterUpdateCheck]
        );
    }

    #[test]
    fn test_malformed_payload_is_permanent() {
        let err = ctx(JobType::Download, serde_json::json!({ "manga_id": 7 }))
            .parse_payload::<crate::modules::jobs::domain::entities::DownloadPayload>()
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(!err.is_retryable());

        let stored = err.public_message();
        assert!(stored.starts_with("Invalid job payload: download payload: "));
        assert_eq!(stored.matches("Invalid").count(), 1);
    }
}
