//! Resilient call executor with per-attempt deadline, retry and backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::outcome::{AttemptRecord, ExecutionReport, InvocationError, InvocationOutcome};
use crate::request::InvocationRequest;

/// Wraps one outbound call with a deadline and retries it per the request's policy.
///
/// - Each attempt races the call against `request.deadline()`; losing the race drops
///   the call future, which releases whatever connection it held.
/// - Retryable failures (`Timeout`, `Transient`) sleep `backoff.delay(n)` and try again.
/// - Any other failure returns immediately as `FatalFailure`.
/// - Exhaustion returns `FatalFailure(Exhausted { attempts, last })`.
///
/// The executor never spawns: dropping the returned future stops everything. The
/// cancellation token covers callers that keep the future alive but stop listening.
#[derive(Debug, Clone, Default)]
pub struct CallExecutor {
    cancel: CancellationToken,
}

impl CallExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `call` under the request's deadline and attempt budget.
    pub async fn execute<P, T, F, Fut>(
        &self,
        request: &InvocationRequest<P>,
        mut call: F,
    ) -> ExecutionReport<T>
    where
        F: FnMut(&InvocationRequest<P>) -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        let max_attempts = request.max_attempts();
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(max_attempts as usize);
        let mut last_error: Option<InvocationError> = None;

        for index in 0..max_attempts {
            let backoff = match index {
                0 => Duration::ZERO,
                n => request.backoff().delay(n - 1),
            };

            if !backoff.is_zero() {
                debug!(
                    target_id = %request.target(),
                    attempt = index + 1,
                    delay_ms = backoff.as_millis() as u64,
                    "backing off before retry"
                );

                let cancelled = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => true,
                    _ = tokio::time::sleep(backoff) => false,
                };
                if cancelled {
                    return self.cancelled(request, attempts);
                }
            }

            if self.cancel.is_cancelled() {
                return self.cancelled(request, attempts);
            }

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                r = tokio::time::timeout(request.deadline(), call(request)) => {
                    Some(r.unwrap_or(Err(InvocationError::Timeout)))
                }
            };
            let elapsed = started.elapsed();

            let Some(result) = result else {
                attempts.push(AttemptRecord {
                    attempt: index + 1,
                    backoff,
                    elapsed,
                    error: Some(InvocationError::Cancelled),
                });
                return self.cancelled(request, attempts);
            };

            let outcome = InvocationOutcome::classify(result);
            attempts.push(AttemptRecord {
                attempt: index + 1,
                backoff,
                elapsed,
                error: outcome.error(),
            });

            match outcome {
                InvocationOutcome::Success(value) => {
                    if index > 0 {
                        debug!(target_id = %request.target(), attempt = index + 1, "call succeeded after retry");
                    }
                    return ExecutionReport {
                        target: request.target().clone(),
                        outcome: InvocationOutcome::Success(value),
                        attempts,
                    };
                }
                InvocationOutcome::FatalFailure(error) => {
                    warn!(
                        target_id = %request.target(),
                        attempt = index + 1,
                        error = %error,
                        "non-retryable failure, not retrying"
                    );
                    return ExecutionReport {
                        target: request.target().clone(),
                        outcome: InvocationOutcome::FatalFailure(error),
                        attempts,
                    };
                }
                InvocationOutcome::TimedOut => {
                    debug!(
                        target_id = %request.target(),
                        attempt = index + 1,
                        deadline_ms = request.deadline().as_millis() as u64,
                        "call timed out"
                    );
                    last_error = Some(InvocationError::Timeout);
                }
                InvocationOutcome::TransientFailure(error) => {
                    debug!(
                        target_id = %request.target(),
                        attempt = index + 1,
                        error = %error,
                        "transient failure"
                    );
                    last_error = Some(error);
                }
            }
        }

        let last = last_error.unwrap_or(InvocationError::Timeout);
        warn!(
            target_id = %request.target(),
            attempts = max_attempts,
            error = %last,
            "retries exhausted"
        );

        ExecutionReport {
            target: request.target().clone(),
            outcome: InvocationOutcome::FatalFailure(InvocationError::Exhausted {
                attempts: max_attempts,
                last: Box::new(last),
            }),
            attempts,
        }
    }

    fn cancelled<P, T>(
        &self,
        request: &InvocationRequest<P>,
        attempts: Vec<AttemptRecord>,
    ) -> ExecutionReport<T> {
        debug!(target_id = %request.target(), attempts = attempts.len(), "invocation cancelled");
        ExecutionReport {
            target: request.target().clone(),
            outcome: InvocationOutcome::FatalFailure(InvocationError::Cancelled),
            attempts,
        }
    }
}
