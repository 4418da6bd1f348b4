//! `insightforge-invoke`
//!
//! **Responsibility:** make slow, failing, rate-limited outbound calls behave as one
//! bounded operation.
//!
//! ## Components
//!
//! - `BackoffSchedule`: pure retry delay sequence (`base * 2^n`)
//! - `CallExecutor`: per-attempt deadline, retry with backoff, fatal short-circuit
//! - `FallbackChain`: ordered targets, first success wins
//! - `JobPoller`: create/poll/fetch protocol under one overall deadline
//!
//! Every suspension point observes the executor's `CancellationToken`; dropping the
//! returned futures abandons the in-flight call.

pub mod backoff;
pub mod executor;
pub mod fallback;
pub mod outcome;
pub mod poller;
pub mod request;

pub use backoff::BackoffSchedule;
pub use executor::CallExecutor;
pub use fallback::{AbandonedTarget, FallbackChain, FallbackPlan, FallbackReport};
pub use outcome::{AttemptRecord, ExecutionReport, InvocationError, InvocationOutcome};
pub use poller::{
    AsyncJob, JobPoller, JobProgress, JobProtocol, JobStatus, JobTransitionError, PollReport,
    PollerConfig,
};
pub use request::{InvocationRequest, RetryPolicy, TargetId};
