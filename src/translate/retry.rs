//! Bounded retry with linear backoff.
//!
//! The state machine only decides; waiting goes through a [`Sleeper`] so tests can
//! record the requested delays instead of sleeping.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::TranslateConfig;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time::sleep`.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_backoff: Duration,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &TranslateConfig) -> Self {
        Self {
            base: config.retry_base_delay(),
            max_backoff: config.max_backoff(),
            max_retries: config.max_retries,
        }
    }

    /// Wait before retry number `attempt + 1`: `base * (attempt + 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.saturating_add(1)).min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Attempts made so far, counting the one that just failed.
    pub fn attempts(&self) -> u32 {
        self.failures
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        let retry = self.failures;
        self.failures += 1;
        if retry < self.policy.max_retries {
            RetryDecision::RetryAfter(self.policy.backoff(retry))
        } else {
            RetryDecision::GiveUp
        }
    }
}
