/// Background worker that claims and executes queued jobs
///
/// A single poll loop claims up to the free capacity on every tick and hands
/// each job to its registered handler as an independent task. A semaphore
/// caps in-flight jobs at `max_concurrent_jobs`; the loop itself never waits
/// on a handler.
use crate::modules::jobs::domain::entities::{JobRecord, JobStatus, JobType};
use crate::modules::jobs::domain::repository::JobRepository;
use crate::modules::jobs::domain::value_objects::{RetryBackoff, RetryDecision};
use crate::modules::jobs::handlers::{HandlerRegistry, JobContext, JobEventListener};
use crate::shared::errors::AppError;
use crate::shared::utils::logger::{LogContext, TimedOperation};
use crate::{log_debug, log_error, log_info, log_warn};
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runner tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
    /// How long `stop()` waits for in-flight jobs before abandoning them
    pub shutdown_timeout: Duration,
    pub retry_backoff: RetryBackoff,
    /// Running jobs claimed longer ago than this are recovered; `None` disables
    pub stale_job_timeout: Option<Duration>,
    pub stale_check_interval: Duration,
    /// Consecutive failed claims after which the loop gives up
    pub max_consecutive_poll_failures: u32,
    /// Job types this runner claims; `None` claims every type with a
    /// registered handler
    pub eligible_types: Option<Vec<JobType>>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(30),
            retry_backoff: RetryBackoff::default(),
            stale_job_timeout: Some(Duration::from_secs(6 * 60 * 60)),
            stale_check_interval: Duration::from_secs(5 * 60),
            max_consecutive_poll_failures: 10,
            eligible_types: None,
        }
    }
}

/// Worker status for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub active_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub poll_interval_seconds: u64,
    /// Why the poll loop last stopped on its own, if it did
    pub last_error: Option<String>,
    pub active_job_ids: Vec<Uuid>,
}

struct RunControl {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Removes a job from the active table when its task ends, including abort
struct ActiveJobGuard {
    active_jobs: Arc<DashMap<Uuid, JobType>>,
    job_id: Uuid,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.active_jobs.remove(&self.job_id);
    }
}

/// Background worker that processes jobs from the queue
pub struct BackgroundWorker {
    job_repository: Arc<dyn JobRepository>,
    handlers: HandlerRegistry,
    listeners: Vec<Arc<dyn JobEventListener>>,
    config: WorkerConfig,
    eligible_types: Vec<JobType>,
    is_running: AtomicBool,
    active_jobs: Arc<DashMap<Uuid, JobType>>,
    last_error: RwLock<Option<String>>,
    control: Mutex<Option<RunControl>>,
}

impl BackgroundWorker {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        handlers: HandlerRegistry,
        config: WorkerConfig,
    ) -> Self {
        let eligible_types = config
            .eligible_types
            .clone()
            .unwrap_or_else(|| handlers.job_types());

        Self {
            job_repository,
            handlers,
            listeners: Vec::new(),
            config,
            eligible_types,
            is_running: AtomicBool::new(false),
            active_jobs: Arc::new(DashMap::new()),
            last_error: RwLock::new(None),
            control: Mutex::new(None),
        }
    }

    /// Add an observer notified after each completion or failure
    pub fn with_listener(mut self, listener: Arc<dyn JobEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Start the poll loop as a background task. No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut control = self.control.lock().await;

        if self.is_running() {
            log_warn!("Background worker already running");
            return;
        }

        // A loop that stopped itself after store failures still has a handle
        if let Some(previous) = control.take() {
            if let Err(e) = previous.handle.await {
                log_error!("Previous background worker loop ended abnormally: {}", e);
            }
        }

        *self.last_error.write().await = None;
        self.is_running.store(true, Ordering::Release);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).run(cancel.clone()));
        *control = Some(RunControl { cancel, handle });

        log_info!(
            "Background worker started (max {} concurrent, poll every {:?})",
            self.config.max_concurrent_jobs,
            self.config.poll_interval
        );
    }

    /// Stop polling and drain in-flight jobs.
    ///
    /// Jobs still running after `shutdown_timeout` are aborted and left in
    /// `running`; the stale-job reaper of a later runner recovers them.
    pub async fn stop(&self) {
        let Some(control) = self.control.lock().await.take() else {
            return;
        };

        log_info!("Background worker stop requested");
        control.cancel.cancel();

        if let Err(e) = control.handle.await {
            log_error!("Background worker loop ended abnormally: {}", e);
        }

        self.is_running.store(false, Ordering::Release);
        log_info!("Background worker stopped");
    }

    pub async fn get_worker_status(&self) -> WorkerStatus {
        let mut active_job_ids: Vec<Uuid> = self.active_jobs.iter().map(|entry| *entry.key()).collect();
        active_job_ids.sort();

        WorkerStatus {
            running: self.is_running(),
            active_jobs: active_job_ids.len(),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            poll_interval_seconds: self.config.poll_interval.as_secs(),
            last_error: self.last_error.read().await.clone(),
            active_job_ids,
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut consecutive_failures: u32 = 0;
        let mut next_stale_check = Instant::now();

        loop {
            while let Some(result) = join_set.try_join_next() {
                if let Err(err) = result {
                    log_error!("Job task ended abnormally: {}", err);
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            if let Some(timeout) = self.config.stale_job_timeout {
                if Instant::now() >= next_stale_check {
                    self.recover_stale_jobs(timeout).await;
                    next_stale_check = Instant::now() + self.config.stale_check_interval;
                }
            }

            let capacity = semaphore.available_permits();
            if capacity > 0 && !self.eligible_types.is_empty() {
                match self
                    .job_repository
                    .claim_next(&self.eligible_types, capacity)
                    .await
                {
                    Ok(jobs) => {
                        consecutive_failures = 0;
                        for job in jobs {
                            // Never blocks: at most `capacity` jobs were claimed
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                log_error!("Concurrency semaphore closed; job {} left running", job.id);
                                continue;
                            };

                            self.active_jobs.insert(job.id, job.job_type);
                            let guard = ActiveJobGuard {
                                active_jobs: Arc::clone(&self.active_jobs),
                                job_id: job.id,
                            };
                            LogContext::job_transition(&job.id, job.job_type.as_str(), "pending", "running");

                            let worker = Arc::clone(&self);
                            join_set.spawn(async move {
                                let _permit = permit;
                                let _guard = guard;
                                worker.execute_job(job).await;
                            });
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        log_error!(
                            "Failed to claim jobs ({} consecutive failures): {}",
                            consecutive_failures,
                            e
                        );

                        if consecutive_failures >= self.config.max_consecutive_poll_failures {
                            log_error!("Job store unreachable, stopping background worker");
                            *self.last_error.write().await = Some(format!(
                                "Stopped after {} consecutive poll failures: {}",
                                consecutive_failures,
                                e.public_message()
                            ));
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.drain(join_set).await;
        self.is_running.store(false, Ordering::Release);
    }

    /// Wait for in-flight jobs up to the shutdown timeout, then abort the rest
    async fn drain(&self, mut join_set: JoinSet<()>) {
        if join_set.is_empty() {
            return;
        }

        log_info!("Waiting for {} in-flight jobs to finish", join_set.len());

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(result) = join_set.join_next().await {
                if let Err(err) = result {
                    log_error!("Job task ended abnormally: {}", err);
                }
            }
        })
        .await;

        if drained.is_err() {
            let abandoned: Vec<Uuid> = self.active_jobs.iter().map(|entry| *entry.key()).collect();
            log_warn!(
                "Shutdown timeout reached, abandoning {} running jobs: {:?}",
                abandoned.len(),
                abandoned
            );
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
        }
    }

    async fn recover_stale_jobs(&self, timeout: Duration) {
        let own_jobs: Vec<Uuid> = self.active_jobs.iter().map(|entry| *entry.key()).collect();

        match self.job_repository.requeue_stale(timeout, &own_jobs).await {
            Ok(recovered) => {
                for job in recovered {
                    log_warn!(
                        "Recovered stale job {} ({}), now {} after {} retries",
                        job.id,
                        job.job_type,
                        job.status,
                        job.retry_count
                    );
                }
            }
            Err(e) => log_warn!("Stale job check failed: {}", e),
        }
    }

    /// Run one claimed job to a recorded outcome. Never returns an error:
    /// handler failures and panics end up in the store, store failures in the log.
    async fn execute_job(&self, job: JobRecord) {
        log_info!(
            "Processing job {} (type: {}, attempt {}/{})",
            job.id,
            job.job_type,
            job.attempt(),
            job.max_retries + 1
        );

        let Some(handler) = self.handlers.get(job.job_type) else {
            log_error!("No handler registered for job type {}", job.job_type);
            let message = format!("No handler registered for job type {}", job.job_type);
            self.record_failure(&job, &message, RetryDecision::GiveUp).await;
            return;
        };

        let ctx = JobContext::from_record(&job);
        let timer = TimedOperation::new(&format!("job {} ({})", job.id, job.job_type));
        let outcome = AssertUnwindSafe(handler.handle(&ctx)).catch_unwind().await;

        match outcome {
            Ok(Ok(result)) => {
                timer.finish_with_info("completed");
                self.record_completion(&job, result).await;
            }
            Ok(Err(e)) => {
                timer.finish_with_info("failed");
                self.handle_job_error(&job, e).await;
            }
            Err(panic) => {
                log_error!("Handler for job {} panicked: {}", job.id, panic_message(&*panic));
                let error = AppError::InternalError("Job handler panicked".to_string());
                self.record_failure(&job, &error.public_message(), RetryDecision::GiveUp)
                    .await;
            }
        }
    }

    async fn handle_job_error(&self, job: &JobRecord, error: AppError) {
        let decision = if error.is_retryable() {
            RetryDecision::Retry {
                after: self.config.retry_backoff.delay_for(job.retry_count),
            }
        } else {
            RetryDecision::GiveUp
        };

        // Full detail stays in the server log; the store gets the sanitized form
        if decision.will_retry() && job.can_retry() {
            log_warn!("Job {} failed, will retry: {:?}", job.id, error);
        } else {
            log_error!("Job {} failed permanently: {:?}", job.id, error);
        }

        self.record_failure(job, &error.public_message(), decision)
            .await;
    }

    async fn record_completion(&self, job: &JobRecord, result: serde_json::Value) {
        match self.job_repository.mark_completed(job.id, result.clone()).await {
            Ok(true) => {
                LogContext::job_transition(&job.id, job.job_type.as_str(), "running", "completed");
                log_info!("Job {} completed successfully", job.id);

                for listener in &self.listeners {
                    if let Err(e) = listener.on_job_completed(job, &result).await {
                        log_warn!("Completion listener failed for job {}: {}", job.id, e);
                    }
                }
            }
            Ok(false) => {
                log_warn!("Job {} was no longer running; completion ignored", job.id);
            }
            Err(e) => {
                log_error!("Failed to record completion of job {}: {}", job.id, e);
            }
        }
    }

    async fn record_failure(&self, job: &JobRecord, message: &str, decision: RetryDecision) {
        match self
            .job_repository
            .mark_failed(job.id, message, decision)
            .await
        {
            Ok(Some(updated)) => {
                LogContext::job_transition(
                    &updated.id,
                    updated.job_type.as_str(),
                    "running",
                    &updated.status.to_string(),
                );

                if updated.status == JobStatus::Pending {
                    log_info!(
                        "Job {} re-queued (retry {}/{}), available at {}",
                        updated.id,
                        updated.retry_count,
                        updated.max_retries,
                        updated.available_at
                    );
                } else {
                    log_debug!("Job {} marked failed: {}", updated.id, message);
                }

                for listener in &self.listeners {
                    if let Err(e) = listener.on_job_failed(&updated).await {
                        log_warn!("Failure listener failed for job {}: {}", job.id, e);
                    }
                }
            }
            Ok(None) => {
                log_warn!("Job {} was no longer running; failure ignored", job.id);
            }
            Err(e) => {
                log_error!("Failed to record failure of job {}: {}", job.id, e);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::domain::entities::Job;
    use crate::modules::jobs::handlers::JobHandler;
    use crate::modules::jobs::infrastructure::InMemoryJobRepository;
    use crate::shared::errors::AppResult;
    use async_trait::async_trait;

    struct Panics;

    #[async_trait]
    impl JobHandler for Panics {
        async fn handle(&self, _ctx: &JobContext) -> AppResult<serde_json::Value> {
            panic!("handler bug");
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            retry_backoff: RetryBackoff::none(),
            stale_job_timeout: None,
            ..WorkerConfig::default()
        }
    }

    #[test]
    fn test_default_config_claims_registered_types() {
        let config = WorkerConfig::default();
        assert_eq!(config.eligible_types, None);
        assert_eq!(config.max_concurrent_jobs, 2);

        let mut handlers = HandlerRegistry::new();
        handlers.register(JobType::LibraryScan, Arc::new(Panics));
        let worker = BackgroundWorker::new(Arc::new(InMemoryJobRepository::new()), handlers, config);
        assert_eq!(worker.eligible_types, vec![JobType::LibraryScan]);

        let explicit = WorkerConfig {
            eligible_types: Some(JobType::ALL.to_vec()),
            ..WorkerConfig::default()
        };
        let worker = BackgroundWorker::new(
            Arc::new(InMemoryJobRepository::new()),
            HandlerRegistry::new(),
            explicit,
        );
        assert_eq!(worker.eligible_types, JobType::ALL.to_vec());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*boxed), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_handler_panic_fails_job_without_retry() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = repo.enqueue(Job::library_scan(None, 5)).await.unwrap();

        let mut handlers = HandlerRegistry::new();
        handlers.register(JobType::LibraryScan, Arc::new(Panics));
        let worker = BackgroundWorker::new(repo.clone(), handlers, fast_config());

        let claimed = repo.claim_next(&JobType::ALL, 1).await.unwrap().remove(0);
        worker.execute_job(claimed).await;

        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.error_message.as_deref(), Some("Internal error"));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let worker = BackgroundWorker::new(repo, HandlerRegistry::new(), fast_config());

        worker.stop().await;
        assert!(!worker.get_worker_status().await.running);
    }
}
