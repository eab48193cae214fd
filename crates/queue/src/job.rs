//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind, used as the dispatch key: exactly one handler per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Batched restock notification for one subscriber.
    SendNotification,
    /// Region-was-removed notice for one subscriber.
    SendExpiryNotice,
    /// Materialize a subscription: subscriber-set additions + confirmation.
    ProcessSubscribe,
    /// Post-delete cleanup after an unsubscribe by email.
    ProcessUnsubscribe,
    /// Post-delete cleanup after an unsubscribe by token.
    ProcessUnsubscribeByToken,
    /// Send the verification mail for a fresh signup.
    SendVerification,
    /// Complete verification after the subscriber clicked the link.
    ProcessVerification,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::SendNotification => "send_notification",
            JobKind::SendExpiryNotice => "send_expiry_notice",
            JobKind::ProcessSubscribe => "process_subscribe",
            JobKind::ProcessUnsubscribe => "process_unsubscribe",
            JobKind::ProcessUnsubscribeByToken => "process_unsubscribe_by_token",
            JobKind::SendVerification => "send_verification",
            JobKind::ProcessVerification => "process_verification",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
///
/// `Completed` and `Failed` are terminal. A retryable failure goes back to
/// `Waiting` with a backoff deadline; `Failed` is only reached once retries
/// are exhausted or the handler declared the failure permanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued (or scheduled for a retry), waiting to be claimed.
    Waiting,
    /// Claimed by a worker, currently executing.
    Active,
    /// Finished successfully.
    Completed,
    /// Permanently failed; reported, never retried again.
    Failed { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1).
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (0 = try once anyway).
    pub max_attempts: u32,
    /// Base delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    /// Matches the queue-wide defaults: three attempts, exponential backoff
    /// starting at two seconds.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A policy that only ever tries once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Fixed delay between every retry.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Exponential backoff with a cap.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the retry following the given attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1) as i32);
                (base_ms * exp).min(max_ms)
            }
        };
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether another attempt is allowed after `attempt` attempts so far.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Bounded retention of terminal jobs, so the queue's storage does not grow
/// without bound. Oldest terminal jobs are trimmed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 100,
            keep_failed: 50,
        }
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Kind for handler dispatch.
    pub kind: JobKind,
    /// Kind-specific JSON payload.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far (0 until first claim).
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job becomes claimable again (set by retry backoff).
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Errors from previous attempts, oldest first.
    pub errors: Vec<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Waiting,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            errors: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Whether the job is claimable now (waiting and past any backoff
    /// deadline).
    pub fn is_ready(&self) -> bool {
        self.status == JobStatus::Waiting
            && match self.scheduled_at {
                Some(at) => Utc::now() >= at,
                None => true,
            }
    }

    /// Claim for execution: mark active and count the attempt.
    pub fn mark_active(&mut self) {
        self.status = JobStatus::Active;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Record a retryable failure: back to `Waiting` with a backoff
    /// deadline if attempts remain, otherwise terminal `Failed`.
    pub fn mark_retryable_failure(&mut self, error: String) {
        let now = Utc::now();
        self.updated_at = now;
        self.errors.push(error.clone());

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at =
                Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Waiting;
        } else {
            self.status = JobStatus::Failed {
                error,
                attempts: self.attempt,
            };
        }
    }

    /// Record a permanent failure: straight to terminal `Failed`, no retry.
    /// Used when retrying cannot help (e.g. the record the job needs no
    /// longer exists).
    pub fn mark_permanent_failure(&mut self, error: String) {
        self.updated_at = Utc::now();
        self.errors.push(error.clone());
        self.status = JobStatus::Failed {
            error,
            attempts: self.attempt,
        };
    }
}

/// Outcome of one handler invocation.
#[derive(Debug)]
pub enum JobResult {
    /// The job's side effect is done.
    Success,
    /// Transient failure; retry per the job's backoff policy.
    Retry(String),
    /// Permanent failure; do not retry (precondition can never be met).
    Discard(String),
}
