// src/status.rs

//! The closed status vocabulary for jobs, plus the thread-safe holder that
//! enforces transition rules.
//!
//! Statuses fall into three categories:
//! - *pending*: the job has not produced a result yet (`Hold`, `Queued`,
//!   `Running`)
//! - *exit-zero*: terminal, does not fail the run (`Success`, `Skip`,
//!   `Silent`)
//! - *exit-nonzero*: terminal, fails the run (`Fail`, `Diff`, `Deleted`,
//!   `Error`, `Race`, `Timeout`)
//!
//! `Finished` is a terminal umbrella for callers whose [`crate::spec::JobSpec`]
//! carries the detailed result elsewhere; it counts as exit-zero.
//!
//! Because the vocabulary is a closed enum, an "invalid status" cannot be
//! constructed; every transition site matches exhaustively.

use std::sync::Mutex;

/// One job status. Each value carries display, exit-code and sort metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    // Pending.
    Hold,
    Queued,
    Running,
    // Terminal, exit-zero.
    Success,
    Skip,
    Silent,
    Finished,
    // Terminal, exit-nonzero.
    Fail,
    Diff,
    Deleted,
    Error,
    Race,
    Timeout,
}

/// Coarse partition of the vocabulary, used for counting and propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Pending,
    ExitZero,
    ExitNonzero,
}

impl Status {
    pub fn category(self) -> StatusCategory {
        match self {
            Status::Hold | Status::Queued | Status::Running => StatusCategory::Pending,
            Status::Success | Status::Skip | Status::Silent | Status::Finished => {
                StatusCategory::ExitZero
            }
            Status::Fail
            | Status::Diff
            | Status::Deleted
            | Status::Error
            | Status::Race
            | Status::Timeout => StatusCategory::ExitNonzero,
        }
    }

    /// A terminal status is absorbing: once set, the job never goes back to
    /// a pending state.
    pub fn is_finished(self) -> bool {
        self.category() != StatusCategory::Pending
    }

    pub fn is_pending(self) -> bool {
        self.category() == StatusCategory::Pending
    }

    /// Whether this status makes the whole run exit non-zero.
    pub fn is_failing(self) -> bool {
        self.category() == StatusCategory::ExitNonzero
    }

    /// Display label, as printed in result rows.
    pub fn label(self) -> &'static str {
        match self {
            Status::Hold => "HOLD",
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Success => "OK",
            Status::Skip => "SKIP",
            Status::Silent => "SILENT",
            Status::Finished => "FINISHED",
            Status::Fail => "FAIL",
            Status::Diff => "DIFF",
            Status::Deleted => "DELETED",
            Status::Error => "ERROR",
            Status::Race => "RACE",
            Status::Timeout => "TIMEOUT",
        }
    }

    /// ANSI color escape for the label.
    pub fn color(self) -> &'static str {
        match self.category() {
            StatusCategory::Pending => "\x1b[36m",     // cyan
            StatusCategory::ExitZero => "\x1b[32m",    // green
            StatusCategory::ExitNonzero => "\x1b[31m", // red
        }
    }

    /// Contribution of this status to the process exit code. Exit-zero and
    /// pending statuses contribute 0.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Fail => 1,
            Status::Diff => 2,
            Status::Deleted => 3,
            Status::Error => 4,
            Status::Race => 5,
            Status::Timeout => 6,
            _ => 0,
        }
    }

    /// Ordering key for report output: failures sort after passes so they
    /// end up at the bottom of a sorted report.
    pub fn sort_value(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Finished => 1,
            Status::Silent => 2,
            Status::Skip => 3,
            Status::Deleted => 4,
            Status::Diff => 5,
            Status::Fail => 6,
            Status::Race => 7,
            Status::Timeout => 8,
            Status::Error => 9,
            Status::Hold => 10,
            Status::Queued => 11,
            Status::Running => 12,
        }
    }
}

/// Holder for the current status of one job.
///
/// Reads and writes are serialized through a mutex so a runner task can
/// flip `Queued` → `Running` while the coordinating loop polls the same
/// job. Writes after a terminal status has been set are ignored, which
/// makes double-finalization (e.g. a timeout racing a normal completion)
/// harmless.
#[derive(Debug)]
pub struct StatusSystem {
    current: Mutex<Status>,
}

impl StatusSystem {
    /// New jobs start in `Hold`.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Status::Hold),
        }
    }

    pub fn get(&self) -> Status {
        *self.current.lock().expect("status lock poisoned")
    }

    /// Set the status, returning the status now in effect.
    ///
    /// A no-op once a finished-category status has been set.
    pub fn set(&self, next: Status) -> Status {
        let mut current = self.current.lock().expect("status lock poisoned");
        if current.is_finished() {
            return *current;
        }
        *current = next;
        *current
    }
}

impl Default for StatusSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_absorbing() {
        let status = StatusSystem::new();
        assert_eq!(status.get(), Status::Hold);
        assert_eq!(status.set(Status::Queued), Status::Queued);
        assert_eq!(status.set(Status::Running), Status::Running);
        assert_eq!(status.set(Status::Timeout), Status::Timeout);
        // Once terminal, further writes (including back to pending) are ignored.
        assert_eq!(status.set(Status::Running), Status::Timeout);
        assert_eq!(status.set(Status::Success), Status::Timeout);
        assert_eq!(status.get(), Status::Timeout);
    }

    #[test]
    fn categories_partition_the_vocabulary() {
        assert!(Status::Hold.is_pending());
        assert!(Status::Silent.is_finished());
        assert!(!Status::Silent.is_failing());
        assert!(Status::Race.is_failing());
        assert_eq!(Status::Success.exit_code(), 0);
        assert_ne!(Status::Timeout.exit_code(), 0);
    }
}
