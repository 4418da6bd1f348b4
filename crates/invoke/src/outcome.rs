//! Invocation outcomes and the failure taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::request::TargetId;

/// Why an outbound call (or a whole invocation) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Missing credential or unknown target. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The per-call (or overall) deadline elapsed.
    #[error("deadline exceeded")]
    Timeout,

    /// Remote 5xx, throttling, connection reset.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote explicitly rejected the request as permanently invalid.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// An asynchronous job reported failure.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// Too many consecutive status-check errors while polling a job.
    #[error("status checks failed {consecutive_errors} times in a row: {last}")]
    PollBudgetExhausted { consecutive_errors: u32, last: String },

    /// The caller stopped listening.
    #[error("cancelled")]
    Cancelled,

    /// Every attempt failed; wraps the last observed cause.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<InvocationError>,
    },
}

impl InvocationError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient(_))
    }

    /// The innermost cause, looking through `Exhausted`.
    pub fn root_cause(&self) -> &InvocationError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Timeout => "timeout",
            Self::Transient(_) => "transient_failure",
            Self::Rejected(_) => "rejected",
            Self::JobFailed(_) => "job_failed",
            Self::PollBudgetExhausted { .. } => "poll_failed",
            Self::Cancelled => "cancelled",
            Self::Exhausted { .. } => "retries_exhausted",
        }
    }
}

/// Result of one invocation. Exactly one tag is set.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome<T> {
    Success(T),
    TimedOut,
    TransientFailure(InvocationError),
    FatalFailure(InvocationError),
}

impl<T> InvocationOutcome<T> {
    /// Classify the raw result of a single call into an outcome tag.
    pub fn classify(result: Result<T, InvocationError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(InvocationError::Timeout) => Self::TimedOut,
            Err(e) if e.is_retryable() => Self::TransientFailure(e),
            Err(e) => Self::FatalFailure(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::TimedOut => "timed_out",
            Self::TransientFailure(_) => "transient_failure",
            Self::FatalFailure(_) => "fatal_failure",
        }
    }

    /// The failure cause, if this is not a success.
    pub fn error(&self) -> Option<InvocationError> {
        match self {
            Self::Success(_) => None,
            Self::TimedOut => Some(InvocationError::Timeout),
            Self::TransientFailure(e) | Self::FatalFailure(e) => Some(e.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> InvocationOutcome<U> {
        match self {
            Self::Success(v) => InvocationOutcome::Success(f(v)),
            Self::TimedOut => InvocationOutcome::TimedOut,
            Self::TransientFailure(e) => InvocationOutcome::TransientFailure(e),
            Self::FatalFailure(e) => InvocationOutcome::FatalFailure(e),
        }
    }

    pub fn into_result(self) -> Result<T, InvocationError> {
        match self {
            Self::Success(v) => Ok(v),
            Self::TimedOut => Err(InvocationError::Timeout),
            Self::TransientFailure(e) | Self::FatalFailure(e) => Err(e),
        }
    }
}

/// One call made by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Sleep performed before this attempt.
    pub backoff: Duration,
    /// Time spent in the call itself.
    pub elapsed: Duration,
    pub error: Option<InvocationError>,
}

/// Outcome of `CallExecutor::execute` plus its attempt history.
#[derive(Debug, Clone)]
pub struct ExecutionReport<T> {
    pub target: TargetId,
    pub outcome: InvocationOutcome<T>,
    pub attempts: Vec<AttemptRecord>,
}

impl<T> ExecutionReport<T> {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn total_backoff(&self) -> Duration {
        self.attempts
            .iter()
            .map(|a| a.backoff)
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_sets_exactly_one_tag() {
        assert!(matches!(
            InvocationOutcome::classify(Ok::<_, InvocationError>(1)),
            InvocationOutcome::Success(1)
        ));
        assert!(matches!(
            InvocationOutcome::<()>::classify(Err(InvocationError::Timeout)),
            InvocationOutcome::TimedOut
        ));
        assert!(matches!(
            InvocationOutcome::<()>::classify(Err(InvocationError::transient("502"))),
            InvocationOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            InvocationOutcome::<()>::classify(Err(InvocationError::configuration("no key"))),
            InvocationOutcome::FatalFailure(_)
        ));
    }

    #[test]
    fn root_cause_looks_through_exhaustion() {
        let err = InvocationError::Exhausted {
            attempts: 3,
            last: Box::new(InvocationError::transient("503")),
        };

        assert_eq!(err.root_cause(), &InvocationError::transient("503"));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "retries_exhausted");
    }
}
