//! Ordered fallback across distinct targets.

use std::future::Future;

use tracing::{info, warn};

use crate::executor::CallExecutor;
use crate::outcome::{InvocationError, InvocationOutcome};
use crate::request::{InvocationRequest, TargetId};

/// Ordered targets, each with its own deadline and attempt budget.
///
/// Order is fixed by the caller (typically most capable first, cheapest last) and
/// never changes at runtime.
#[derive(Debug, Clone)]
pub struct FallbackPlan<P> {
    targets: Vec<InvocationRequest<P>>,
}

impl<P> FallbackPlan<P> {
    pub fn new(targets: Vec<InvocationRequest<P>>) -> Self {
        Self { targets }
    }

    pub fn single(request: InvocationRequest<P>) -> Self {
        Self::new(vec![request])
    }

    /// Append a lower-priority target.
    pub fn then(mut self, request: InvocationRequest<P>) -> Self {
        self.targets.push(request);
        self
    }

    pub fn targets(&self) -> &[InvocationRequest<P>] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A target the chain gave up on before moving to the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct AbandonedTarget {
    pub target: TargetId,
    pub attempts: u32,
    pub reason: InvocationError,
}

#[derive(Debug, Clone)]
pub struct FallbackReport<T> {
    pub outcome: InvocationOutcome<T>,
    /// Target that produced the success, if any.
    pub winner: Option<TargetId>,
    pub abandoned: Vec<AbandonedTarget>,
    /// Calls made across every target.
    pub attempts: u32,
}

/// Runs a `FallbackPlan` through a `CallExecutor`, one target at a time.
///
/// Targets are never raced: each one would be a separately billed call.
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    executor: CallExecutor,
}

impl FallbackChain {
    pub fn new(executor: CallExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &CallExecutor {
        &self.executor
    }

    /// First success wins; if every target fails, the last target's outcome is returned.
    pub async fn execute<P, T, F, Fut>(&self, plan: &FallbackPlan<P>, mut call: F) -> FallbackReport<T>
    where
        F: FnMut(&InvocationRequest<P>) -> Fut,
        Fut: Future<Output = Result<T, InvocationError>>,
    {
        let mut abandoned = Vec::new();
        let mut attempts = 0;
        let mut targets = plan.targets().iter().peekable();

        while let Some(request) = targets.next() {
            let report = self.executor.execute(request, &mut call).await;
            attempts += report.attempt_count();

            let outcome = match report.outcome {
                InvocationOutcome::Success(value) => {
                    if !abandoned.is_empty() {
                        info!(
                            target_id = %report.target,
                            abandoned = abandoned.len(),
                            "fallback target succeeded"
                        );
                    }
                    return FallbackReport {
                        outcome: InvocationOutcome::Success(value),
                        winner: Some(report.target),
                        abandoned,
                        attempts,
                    };
                }
                other => other,
            };

            let reason = outcome.error().unwrap_or(InvocationError::Timeout);
            let next = match targets.peek() {
                Some(next) if reason != InvocationError::Cancelled => next,
                _ => {
                    return FallbackReport {
                        outcome,
                        winner: None,
                        abandoned,
                        attempts,
                    };
                }
            };

            warn!(
                target_id = %report.target,
                next_target = %next.target(),
                error = %reason,
                "abandoning target, falling back"
            );
            abandoned.push(AbandonedTarget {
                target: report.target,
                attempts: report.attempts.len() as u32,
                reason,
            });
        }

        FallbackReport {
            outcome: InvocationOutcome::FatalFailure(InvocationError::configuration(
                "fallback plan has no targets",
            )),
            winner: None,
            abandoned,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::request::RetryPolicy;

    fn target(name: &str) -> InvocationRequest<String> {
        InvocationRequest::new(
            name,
            format!("prompt for {name}"),
            RetryPolicy::new(Duration::from_secs(5), 2, Duration::from_millis(10)),
        )
    }

    fn scripted(
        seen: Arc<Mutex<Vec<String>>>,
    ) -> impl FnMut(&InvocationRequest<String>) -> std::future::Ready<Result<String, InvocationError>> {
        move |req| {
            seen.lock().unwrap().push(req.target().to_string());
            std::future::ready(match req.target().as_str() {
                "tier-b" => Ok(format!("answer from {}", req.target())),
                "tier-c" => Err(InvocationError::rejected("content policy")),
                _ => Err(InvocationError::transient("overloaded")),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_target_wins_after_first_fails() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let plan = FallbackPlan::single(target("tier-a")).then(target("tier-b"));

        let report = FallbackChain::default().execute(&plan, scripted(seen.clone())).await;

        assert_eq!(
            report.outcome,
            InvocationOutcome::Success("answer from tier-b".to_string())
        );
        assert_eq!(report.winner, Some(TargetId::from("tier-b")));
        assert_eq!(report.abandoned.len(), 1);
        assert_eq!(report.abandoned[0].target, TargetId::from("tier-a"));
        assert_eq!(report.abandoned[0].attempts, 2);
        assert_eq!(report.attempts, 3);
        assert_eq!(*seen.lock().unwrap(), vec!["tier-a", "tier-a", "tier-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failing_returns_the_last_targets_outcome() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let plan = FallbackPlan::new(vec![target("tier-a"), target("tier-c")]);

        let report = FallbackChain::default().execute(&plan, scripted(seen)).await;

        assert_eq!(
            report.outcome,
            InvocationOutcome::FatalFailure(InvocationError::rejected("content policy"))
        );
        assert_eq!(report.winner, None);
        assert_eq!(report.abandoned.len(), 1);
        assert!(matches!(
            report.abandoned[0].reason,
            InvocationError::Exhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn empty_plan_is_a_configuration_failure() {
        let plan: FallbackPlan<String> = FallbackPlan::new(Vec::new());

        let report = FallbackChain::default()
            .execute(&plan, |_req| async { Ok::<_, InvocationError>(()) })
            .await;

        assert!(matches!(
            report.outcome,
            InvocationOutcome::FatalFailure(InvocationError::Configuration(_))
        ));
        assert_eq!(report.attempts, 0);
    }

    #[tokio::test]
    async fn cancellation_is_not_treated_as_a_reason_to_fall_back() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let plan = FallbackPlan::single(target("tier-a")).then(target("tier-b"));

        let report = FallbackChain::new(CallExecutor::with_cancellation(cancel))
            .execute(&plan, scripted(seen.clone()))
            .await;

        assert_eq!(
            report.outcome,
            InvocationOutcome::FatalFailure(InvocationError::Cancelled)
        );
        assert!(report.abandoned.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}
