/// Test handlers and worker harness
use async_trait::async_trait;
use mangashelf::modules::jobs::{
    handlers::{JobContext, JobHandler},
    RetryBackoff, WorkerConfig,
};
use mangashelf::shared::errors::AppResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Worker tuned for tests: fast polling, no retry delay, no reaper
pub fn fast_worker_config(max_concurrent_jobs: usize) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(20),
        max_concurrent_jobs,
        shutdown_timeout: Duration::from_secs(5),
        retry_backoff: RetryBackoff::none(),
        stale_job_timeout: None,
        ..WorkerConfig::default()
    }
}

/// Poll `condition` until it holds; panics after `timeout`
pub async fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler whose behaviour is a plain closure
pub struct FnHandler<F> {
    f: F,
    pub calls: AtomicUsize,
}

impl<F> FnHandler<F>
where
    F: Fn(&JobContext) -> AppResult<serde_json::Value> + Send + Sync,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self {
            f,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&JobContext) -> AppResult<serde_json::Value> + Send + Sync,
{
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(ctx)
    }
}

/// Handler that blocks every job until the test opens the gate, tracking
/// how many run at once
pub struct GatedHandler {
    gate: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl GatedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        })
    }

    /// Let `n` blocked (or future) jobs finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for GatedHandler {
    async fn handle(&self, ctx: &JobContext) -> AppResult<serde_json::Value> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(permit) = permit {
            permit.forget();
        }

        Ok(serde_json::json!({ "job_id": ctx.job_id }))
    }
}
