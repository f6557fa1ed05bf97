// src/exec/backend.rs

//! Pluggable job execution backends.
//!
//! The scheduler talks to a [`JobRunner`] instead of spawning processes
//! itself. Production code uses [`super::local::LocalRunner`] (one OS
//! process per job) or [`super::hpc::HpcRunner`] (remote batch
//! allocations); tests can provide their own implementation that fakes
//! completions.
//!
//! A runner launches each job in its own tokio task and reports back to
//! the coordinating loop with a single [`RunnerEvent`] over an mpsc
//! channel, so a blocking wait on one job never stalls the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::dag::JobId;
use crate::status::StatusSystem;

/// Everything a backend needs to run one job.
#[derive(Clone)]
pub struct LaunchRequest {
    pub id: JobId,
    /// Unique key (test directory + name), used in logs and batch names.
    pub name: String,
    /// Shell command line.
    pub command: String,
    pub max_time: Duration,
    /// Shared status handle; backends flip `Queued`/`Running` as the job
    /// moves through the remote or local lifecycle.
    pub status: Arc<StatusSystem>,
}

/// How a job's execution ended, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The process (or remote allocation) ran to completion.
    Exited(i32),
    /// Terminated for exceeding its maximum run time, or the backend's
    /// own completion deadline expired.
    TimedOut,
    /// The job never produced a usable result (spawn/submission failure,
    /// unreadable result file, ...).
    Error(String),
}

/// Result handed back to the coordinating loop.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Captured (already trimmed) output.
    pub output: String,
    /// Backend-measured run duration, when more accurate than the
    /// coordinator's clock (e.g. remote-reported walltime).
    pub duration: Option<Duration>,
}

impl ExecutionResult {
    pub fn error(message: impl Into<String>, output: String) -> Self {
        Self {
            outcome: ExecutionOutcome::Error(message.into()),
            output,
            duration: None,
        }
    }
}

/// Events sent from runner tasks back to the scheduler loop.
#[derive(Debug)]
pub enum RunnerEvent {
    Completed { id: JobId, result: ExecutionResult },
}

/// Trait abstracting how jobs are executed.
pub trait JobRunner: Send + Sync {
    /// Start the job and return immediately. The implementation must
    /// eventually send exactly one `RunnerEvent::Completed` for the job,
    /// including on timeout and launch failure.
    fn launch(&self, request: LaunchRequest, events: mpsc::Sender<RunnerEvent>);
}
