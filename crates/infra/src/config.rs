//! Pipeline configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;

use restock_queue::{RetentionPolicy, RetryPolicy};

/// Tunables for the notification pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long an unverified signup may live before TTL expiry removes it.
    pub verification_ttl: Duration,
    /// How long after an unsubscribe the same email is refused
    /// re-subscription.
    pub resubscribe_cooldown: Duration,
    /// Retry policy attached to every enqueued job.
    pub retry_policy: RetryPolicy,
    /// Bounded retention of terminal jobs.
    pub retention: RetentionPolicy,
    /// How often the expiry sweeper wakes up.
    pub sweep_interval: StdDuration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::minutes(5),
            resubscribe_cooldown: Duration::minutes(10),
            retry_policy: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
            sweep_interval: StdDuration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    pub fn with_verification_ttl(mut self, ttl: Duration) -> Self {
        self.verification_ttl = ttl;
        self
    }

    pub fn with_resubscribe_cooldown(mut self, cooldown: Duration) -> Self {
        self.resubscribe_cooldown = cooldown;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: StdDuration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
