//! Immutable invocation requests and their retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffSchedule;

/// Identifier of a call target (e.g. a model name or service tier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TargetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-target deadline and attempt budget.
///
/// `max_attempts` counts every call, including the first (so `1` means no retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Wall-clock deadline for a single attempt.
    pub deadline: Duration,
    pub max_attempts: u32,
    pub backoff: BackoffSchedule,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            max_attempts: 3,
            backoff: BackoffSchedule::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(deadline: Duration, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            deadline,
            max_attempts,
            backoff: BackoffSchedule::exponential(base_delay),
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry(deadline: Duration) -> Self {
        Self::new(deadline, 1, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.backoff = self.backoff.with_jitter(jitter);
        self
    }
}

/// One outbound call: where to send it, what to send, and how hard to try.
#[derive(Debug, Clone)]
pub struct InvocationRequest<P> {
    target: TargetId,
    payload: P,
    policy: RetryPolicy,
}

impl<P> InvocationRequest<P> {
    pub fn new(target: impl Into<TargetId>, payload: P, policy: RetryPolicy) -> Self {
        Self {
            target: target.into(),
            payload,
            policy,
        }
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn deadline(&self) -> Duration {
        self.policy.deadline
    }

    /// Attempt budget, never less than one.
    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    pub fn base_delay(&self) -> Duration {
        self.policy.backoff.base_delay
    }

    pub fn backoff(&self) -> &BackoffSchedule {
        &self.policy.backoff
    }
}
