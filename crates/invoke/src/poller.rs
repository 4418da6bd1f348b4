//! Create → poll → fetch lifecycle for remote asynchronous jobs.
//!
//! The poll loop is bounded by a wall-clock deadline, not a poll count. Poll
//! errors are tolerated up to a consecutive-error budget. Once a job handle
//! exists, cleanup is scheduled on every exit path as a detached task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::outcome::{InvocationError, InvocationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Created, Running)
                | (Queued, Running)
                | (Queued | Running, Completed | Failed)
                | (Created | Queued | Running, TimedOut)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct JobTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Local view of a remote job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncJob {
    pub id: String,
    status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub poll_interval: Duration,
    pub deadline: Duration,
    polls: u32,
}

impl AsyncJob {
    pub fn new(id: impl Into<String>, poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Created,
            created_at: Utc::now(),
            poll_interval,
            deadline,
            polls: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn advance(&mut self, next: JobStatus) -> Result<(), JobTransitionError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err(JobTransitionError {
                from: self.status,
                to: next,
            })
        }
    }

    /// Apply a status reported by the remote side.
    ///
    /// A repeated status is a no-op. A job reported finished straight from
    /// `Created` or `Queued` is assumed to have run in between.
    pub fn observe(&mut self, reported: JobStatus) -> Result<(), JobTransitionError> {
        if reported == self.status {
            return Ok(());
        }
        if matches!(reported, JobStatus::Completed | JobStatus::Failed)
            && matches!(self.status, JobStatus::Created)
        {
            self.advance(JobStatus::Running)?;
        }
        self.advance(reported)
    }

    fn record_poll(&mut self) {
        self.polls += 1;
    }
}

/// One status check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub status: JobStatus,
    /// Remote failure reason, when `status` is `Failed`.
    pub error: Option<String>,
}

impl JobProgress {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(reason.into()),
        }
    }
}

/// A remote service that runs work asynchronously behind a handle.
#[async_trait]
pub trait JobProtocol: Send + Sync + 'static {
    type Payload: Send + Sync;
    type Handle: Clone + Send + Sync + fmt::Display + 'static;
    type Output: Send;

    async fn create(&self, payload: &Self::Payload) -> Result<Self::Handle, InvocationError>;

    async fn poll(&self, handle: &Self::Handle) -> Result<JobProgress, InvocationError>;

    async fn fetch(&self, handle: &Self::Handle) -> Result<Self::Output, InvocationError>;

    /// Release remote resources. Failures are logged by the poller, never surfaced.
    async fn cleanup(&self, handle: &Self::Handle) -> Result<(), InvocationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Wall-clock budget for the whole job, creation included.
    pub deadline: Duration,
    /// Consecutive poll errors tolerated before giving up.
    pub poll_error_budget: u32,
    pub cleanup_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
            poll_error_budget: 3,
            cleanup_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub struct PollReport<T> {
    /// `None` when creation itself failed.
    pub job: Option<AsyncJob>,
    pub outcome: InvocationOutcome<T>,
    /// Detached cleanup task; callers may await it but need not.
    pub cleanup: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Default)]
pub struct JobPoller {
    config: PollerConfig,
    cancel: CancellationToken,
}

impl JobPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub async fn run<J>(&self, protocol: Arc<J>, payload: &J::Payload) -> PollReport<J::Output>
    where
        J: JobProtocol + ?Sized,
    {
        let deadline_at = Instant::now() + self.config.deadline;

        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(InvocationError::Cancelled),
            r = tokio::time::timeout_at(deadline_at, protocol.create(payload)) => {
                r.unwrap_or(Err(InvocationError::Timeout))
            }
        };

        let handle = match created {
            Ok(handle) => handle,
            Err(error) => {
                warn!(error = %error, "job creation failed");
                return PollReport {
                    job: None,
                    outcome: InvocationOutcome::classify(Err(error)),
                    cleanup: None,
                };
            }
        };

        let mut job = AsyncJob::new(handle.to_string(), self.config.interval, self.config.deadline);
        info!(job_id = %handle, "job created");

        let outcome = self.drive(protocol.as_ref(), &handle, &mut job, deadline_at).await;
        debug!(job_id = %handle, status = %job.status(), outcome = outcome.label(), polls = job.polls(), "job finished");

        let cleanup = spawn_cleanup(protocol, handle, self.config.cleanup_timeout);

        PollReport {
            job: Some(job),
            outcome,
            cleanup: Some(cleanup),
        }
    }

    async fn drive<J>(
        &self,
        protocol: &J,
        handle: &J::Handle,
        job: &mut AsyncJob,
        deadline_at: Instant,
    ) -> InvocationOutcome<J::Output>
    where
        J: JobProtocol + ?Sized,
    {
        let mut consecutive_errors = 0u32;

        loop {
            let wake_at = (Instant::now() + self.config.interval).min(deadline_at);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return InvocationOutcome::FatalFailure(InvocationError::Cancelled),
                _ = tokio::time::sleep_until(wake_at) => {}
            }

            if Instant::now() >= deadline_at {
                return expire(job);
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(InvocationError::Cancelled),
                r = tokio::time::timeout_at(deadline_at, protocol.poll(handle)) => {
                    r.unwrap_or(Err(InvocationError::Timeout))
                }
            };
            job.record_poll();

            let progress = match polled {
                Ok(progress) => {
                    consecutive_errors = 0;
                    progress
                }
                Err(InvocationError::Cancelled) => {
                    return InvocationOutcome::FatalFailure(InvocationError::Cancelled);
                }
                Err(InvocationError::Timeout) if Instant::now() >= deadline_at => {
                    return expire(job);
                }
                Err(error) if error.is_retryable() => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.config.poll_error_budget {
                        warn!(job_id = %handle, consecutive_errors, error = %error, "status checks keep failing");
                        return InvocationOutcome::TransientFailure(
                            InvocationError::PollBudgetExhausted {
                                consecutive_errors,
                                last: error.to_string(),
                            },
                        );
                    }
                    debug!(job_id = %handle, consecutive_errors, error = %error, "status check failed");
                    continue;
                }
                Err(error) => return InvocationOutcome::FatalFailure(error),
            };

            if let Err(e) = job.observe(progress.status) {
                debug!(job_id = %handle, error = %e, "ignoring out-of-order status");
            }

            match job.status() {
                JobStatus::Completed => {
                    let fetched = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Err(InvocationError::Cancelled),
                        r = tokio::time::timeout_at(deadline_at, protocol.fetch(handle)) => {
                            r.unwrap_or(Err(InvocationError::Timeout))
                        }
                    };
                    return InvocationOutcome::classify(fetched);
                }
                JobStatus::Failed => {
                    let reason = progress
                        .error
                        .unwrap_or_else(|| "remote job reported failure".to_string());
                    return InvocationOutcome::FatalFailure(InvocationError::JobFailed(reason));
                }
                JobStatus::TimedOut => {
                    return InvocationOutcome::FatalFailure(InvocationError::JobFailed(
                        "remote job timed out".to_string(),
                    ));
                }
                JobStatus::Created | JobStatus::Queued | JobStatus::Running => {}
            }
        }
    }
}

fn expire<T>(job: &mut AsyncJob) -> InvocationOutcome<T> {
    if let Err(e) = job.advance(JobStatus::TimedOut) {
        debug!(job_id = %job.id, error = %e, "job already terminal at deadline");
    }
    warn!(job_id = %job.id, polls = job.polls(), deadline_ms = job.deadline.as_millis() as u64, "job deadline exceeded");
    InvocationOutcome::TimedOut
}

fn spawn_cleanup<J>(protocol: Arc<J>, handle: J::Handle, limit: Duration) -> JoinHandle<()>
where
    J: JobProtocol + ?Sized,
{
    tokio::spawn(async move {
        match tokio::time::timeout(limit, protocol.cleanup(&handle)).await {
            Ok(Ok(())) => debug!(job_id = %handle, "job cleaned up"),
            Ok(Err(error)) => warn!(job_id = %handle, error = %error, "job cleanup failed"),
            Err(_) => warn!(job_id = %handle, "job cleanup timed out"),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Replays scripted status responses; once the script runs out it keeps
    /// answering with the fallback status.
    struct ScriptedJobs {
        script: Mutex<VecDeque<Result<JobProgress, InvocationError>>>,
        fallback: JobStatus,
        fetches: AtomicU32,
        cleanups: AtomicU32,
    }

    impl ScriptedJobs {
        fn new(script: Vec<Result<JobProgress, InvocationError>>, fallback: JobStatus) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                fetches: AtomicU32::new(0),
                cleanups: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl JobProtocol for ScriptedJobs {
        type Payload = String;
        type Handle = String;
        type Output = String;

        async fn create(&self, payload: &String) -> Result<String, InvocationError> {
            Ok(format!("job-{payload}"))
        }

        async fn poll(&self, _handle: &String) -> Result<JobProgress, InvocationError> {
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(JobProgress::new(self.fallback)))
        }

        async fn fetch(&self, handle: &String) -> Result<String, InvocationError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{handle}.mp4"))
        }

        async fn cleanup(&self, _handle: &String) -> Result<(), InvocationError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn poller() -> JobPoller {
        JobPoller::new(PollerConfig {
            interval: Duration::from_secs(5),
            deadline: Duration::from_secs(60),
            poll_error_budget: 2,
            cleanup_timeout: Duration::from_secs(1),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_two_polls_and_fetches_result() {
        let jobs = ScriptedJobs::new(
            vec![
                Ok(JobProgress::new(JobStatus::Running)),
                Ok(JobProgress::new(JobStatus::Completed)),
            ],
            JobStatus::Running,
        );

        let report = poller().run(jobs.clone(), &"intro".to_string()).await;

        assert_eq!(report.outcome, InvocationOutcome::Success("job-intro.mp4".to_string()));
        let job = report.job.as_ref().expect("job created");
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.polls(), 2);
        assert_eq!(jobs.fetches.load(Ordering::SeqCst), 1);

        report.cleanup.expect("cleanup scheduled").await.unwrap();
        assert_eq!(jobs.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_times_out_without_fetching() {
        let jobs = ScriptedJobs::new(Vec::new(), JobStatus::Running);
        let started = Instant::now();

        let report = poller().run(jobs.clone(), &"stuck".to_string()).await;

        assert_eq!(report.outcome, InvocationOutcome::TimedOut);
        assert_eq!(report.job.as_ref().map(AsyncJob::status), Some(JobStatus::TimedOut));
        assert_eq!(jobs.fetches.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() >= Duration::from_secs(60));

        report.cleanup.expect("cleanup scheduled").await.unwrap();
        assert_eq!(jobs.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_within_budget_are_tolerated() {
        let jobs = ScriptedJobs::new(
            vec![
                Err(InvocationError::transient("502")),
                Err(InvocationError::transient("502")),
                Ok(JobProgress::new(JobStatus::Running)),
                Err(InvocationError::transient("502")),
                Ok(JobProgress::new(JobStatus::Completed)),
            ],
            JobStatus::Running,
        );

        let report = poller().run(jobs, &"flaky".to_string()).await;

        assert!(report.outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_beyond_budget_fail_transiently() {
        let jobs = ScriptedJobs::new(
            vec![
                Err(InvocationError::transient("502")),
                Err(InvocationError::transient("502")),
                Err(InvocationError::transient("503")),
            ],
            JobStatus::Running,
        );

        let report = poller().run(jobs.clone(), &"down".to_string()).await;

        assert_eq!(
            report.outcome,
            InvocationOutcome::TransientFailure(InvocationError::PollBudgetExhausted {
                consecutive_errors: 3,
                last: InvocationError::transient("503").to_string(),
            })
        );
        assert_eq!(jobs.fetches.load(Ordering::SeqCst), 0);
        report.cleanup.expect("cleanup scheduled").await.unwrap();
        assert_eq!(jobs.cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_is_fatal_with_reason() {
        let jobs = ScriptedJobs::new(
            vec![
                Ok(JobProgress::new(JobStatus::Queued)),
                Ok(JobProgress::failed("avatar not found")),
            ],
            JobStatus::Running,
        );

        let report = poller().run(jobs, &"bad".to_string()).await;

        assert_eq!(
            report.outcome,
            InvocationOutcome::FatalFailure(InvocationError::JobFailed("avatar not found".to_string()))
        );
        assert_eq!(report.job.map(|j| j.status()), Some(JobStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling_and_still_cleans_up() {
        let cancel = CancellationToken::new();
        let jobs = ScriptedJobs::new(Vec::new(), JobStatus::Running);
        let poller = poller().with_cancellation(cancel.clone());

        let job_name = "left".to_string();
        let run = poller.run(jobs.clone(), &job_name);
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            cancel.cancel();
        };
        let (report, ()) = tokio::join!(run, canceller);

        assert_eq!(report.outcome, InvocationOutcome::FatalFailure(InvocationError::Cancelled));
        report.cleanup.expect("cleanup scheduled").await.unwrap();
        assert_eq!(jobs.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = AsyncJob::new("j1", Duration::from_secs(1), Duration::from_secs(10));
        job.advance(JobStatus::Queued).unwrap();
        job.advance(JobStatus::Running).unwrap();
        assert!(job.advance(JobStatus::Queued).is_err());
        job.advance(JobStatus::Completed).unwrap();

        let err = job.advance(JobStatus::TimedOut).unwrap_err();
        assert_eq!(err.from, JobStatus::Completed);
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn completed_straight_from_created_passes_through_running() {
        let mut job = AsyncJob::new("j2", Duration::from_secs(1), Duration::from_secs(10));
        job.observe(JobStatus::Completed).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);

        let mut queued = AsyncJob::new("j3", Duration::from_secs(1), Duration::from_secs(10));
        queued.observe(JobStatus::Queued).unwrap();
        queued.observe(JobStatus::Queued).unwrap();
        queued.observe(JobStatus::Completed).unwrap();
        assert_eq!(queued.status(), JobStatus::Completed);
    }
}
