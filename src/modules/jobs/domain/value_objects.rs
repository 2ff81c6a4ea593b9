/// Value objects for jobs domain
use crate::modules::jobs::domain::entities::JobStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job status enum matching database type
#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[ExistingTypePath = "crate::schema::sql_types::JobStatus"]
#[serde(rename_all = "lowercase")]
pub enum JobStatusDb {
    Pending,
    Running,
    Completed,
    Failed,
}

impl From<JobStatusDb> for JobStatus {
    fn from(status: JobStatusDb) -> Self {
        match status {
            JobStatusDb::Pending => JobStatus::Pending,
            JobStatusDb::Running => JobStatus::Running,
            JobStatusDb::Completed => JobStatus::Completed,
            JobStatusDb::Failed => JobStatus::Failed,
        }
    }
}

impl From<JobStatus> for JobStatusDb {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => JobStatusDb::Pending,
            JobStatus::Running => JobStatusDb::Running,
            JobStatus::Completed => JobStatusDb::Completed,
            JobStatus::Failed => JobStatusDb::Failed,
        }
    }
}

/// What the store should do with a job whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue if budget remains, claimable again after `after`
    Retry { after: Duration },
    /// Fail permanently regardless of remaining budget
    GiveUp,
}

impl RetryDecision {
    pub fn will_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }

    pub fn delay(&self) -> Duration {
        match self {
            RetryDecision::Retry { after } => *after,
            RetryDecision::GiveUp => Duration::ZERO,
        }
    }
}

/// Exponential backoff between attempts of a failed job
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryBackoff {
    /// Retried jobs become claimable immediately
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before the attempt following `retry_count` previous retries
    pub fn delay_for(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.clamp(0, 32);
        let exponential_delay =
            self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let mut delay = Duration::from_millis(exponential_delay.min(u64::MAX as f64) as u64);

        // Cap at max delay
        if delay > self.max_delay {
            delay = self.max_delay;
        }

        // Add jitter to prevent thundering herd
        if self.jitter && !delay.is_zero() {
            let jitter_factor = 0.1; // 10% jitter
            let jitter_ms =
                (delay.as_millis() as f64 * jitter_factor * rand::random::<f64>()) as u64;
            delay += Duration::from_millis(jitter_ms);
        }

        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially_until_cap() {
        let backoff = RetryBackoff {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(backoff.delay_for(0), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(20));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(40));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(30), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let backoff = RetryBackoff {
            base_delay: Duration::from_secs(100),
            max_delay: Duration::from_secs(100),
            backoff_multiplier: 2.0,
            jitter: true,
        };

        for _ in 0..50 {
            let delay = backoff.delay_for(0);
            assert!(delay >= Duration::from_secs(100));
            assert!(delay <= Duration::from_secs(110));
        }
    }

    #[test]
    fn test_no_backoff_is_zero() {
        assert_eq!(RetryBackoff::none().delay_for(5), Duration::ZERO);
    }

    #[test]
    fn test_status_conversions() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from(JobStatusDb::from(status)), status);
        }
    }
}
