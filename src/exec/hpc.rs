// src/exec/hpc.rs

//! Batch-scheduler execution backend.
//!
//! A drop-in alternative to [`super::local::LocalRunner`] for clusters
//! managed by a remote batch system (PBS/Slurm-style). The batch system
//! itself is an external collaborator behind the [`BatchSystem`] trait;
//! this module owns the asynchronous reconciliation:
//!
//! - submit the job and remember the opaque handle
//! - poll the remote state until it leaves held/queued/running
//! - wait for two sentinel artifacts on shared storage: the raw output
//!   file and a small JSON result file (exit code + walltime)
//!
//! Network filesystems flush lazily, so a file is only trusted once the
//! scheduler's ending-comment marker is present at its tail (as trailing
//! bytes for the raw output, as the final line for the text result file);
//! the marker is stripped before the content is used.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{ExecutionOutcome, ExecutionResult, JobRunner, LaunchRequest, RunnerEvent};
use super::output::{header, timeout_banner};
use crate::errors::BatchError;
use crate::status::Status;

/// Remote state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Held,
    Queued,
    Running,
    Done,
    Failed,
}

impl BatchState {
    /// States in which the allocation has not produced its artifacts yet.
    pub fn is_pending(self) -> bool {
        matches!(self, BatchState::Held | BatchState::Queued | BatchState::Running)
    }
}

/// Opaque handle returned by the batch system on submission, plus the two
/// well-known artifact paths for the job.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub id: String,
    /// Raw captured output, written by the remote allocation.
    pub output_path: PathBuf,
    /// JSON result file: `{"exit_code": <i32>, "walltime": <f64>}`.
    pub result_path: PathBuf,
}

/// The remote batch scheduler, as seen by this crate.
pub trait BatchSystem: Send + Sync + 'static {
    fn submit(&self, name: &str, command: &str) -> Result<BatchHandle, BatchError>;
    fn state(&self, handle: &BatchHandle) -> Result<BatchState, BatchError>;
    fn cancel(&self, handle: &BatchHandle) -> Result<(), BatchError>;

    /// The sentinel marker the batch wrapper appends to each artifact once
    /// it is fully flushed.
    fn ending_comment(&self) -> String;
}

/// Parsed content of the result sentinel file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    pub exit_code: i32,
    /// Walltime measured by the remote wrapper, in seconds. More accurate
    /// than coordinator-side timing across the scheduler's queueing delay.
    pub walltime: f64,
}

pub struct HpcRunner<B> {
    batch: Arc<B>,
    poll_interval: Duration,
    /// How long to wait for the sentinel files after the remote state goes
    /// terminal.
    file_timeout: Duration,
}

impl<B: BatchSystem> HpcRunner<B> {
    pub fn new(batch: Arc<B>, poll_interval: Duration, file_timeout: Duration) -> Self {
        Self {
            batch,
            poll_interval,
            file_timeout,
        }
    }
}

impl<B: BatchSystem> JobRunner for HpcRunner<B> {
    fn launch(&self, request: LaunchRequest, events: mpsc::Sender<RunnerEvent>) {
        let batch = Arc::clone(&self.batch);
        let poll_interval = self.poll_interval;
        let file_timeout = self.file_timeout;
        tokio::spawn(async move {
            let id = request.id;
            let result = run_remote(batch, poll_interval, file_timeout, request).await;
            let _ = events.send(RunnerEvent::Completed { id, result }).await;
        });
    }
}

async fn run_remote<B: BatchSystem>(
    batch: Arc<B>,
    poll_interval: Duration,
    file_timeout: Duration,
    request: LaunchRequest,
) -> ExecutionResult {
    let handle = match batch.submit(&request.name, &request.command) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(job = %request.name, error = %err, "batch submission failed");
            return ExecutionResult::error(format!("batch submission failed: {err}"), String::new());
        }
    };

    // Output is written remotely; nothing is buffered in memory here.
    request.status.set(Status::Queued);
    info!(
        job = %request.name,
        batch_id = %handle.id,
        live_output = %handle.output_path.display(),
        "submitted to batch scheduler"
    );

    let started = Instant::now();
    loop {
        match batch.state(&handle) {
            Ok(state) if state.is_pending() => {
                if state == BatchState::Running {
                    request.status.set(Status::Running);
                }
            }
            Ok(state) => {
                debug!(job = %request.name, ?state, "batch job reached terminal state");
                break;
            }
            Err(err) => {
                return ExecutionResult::error(
                    format!("batch status query failed: {err}"),
                    String::new(),
                );
            }
        }

        if started.elapsed() > request.max_time {
            warn!(job = %request.name, "batch job exceeded maximum run time; cancelling");
            if let Err(err) = batch.cancel(&handle) {
                warn!(job = %request.name, error = %err, "batch cancellation failed");
            }
            return ExecutionResult {
                outcome: ExecutionOutcome::TimedOut,
                output: timeout_banner(request.max_time),
                duration: None,
            };
        }

        tokio::time::sleep(poll_interval).await;
    }

    wait_for_artifacts(&request, &handle, &batch.ending_comment(), poll_interval, file_timeout)
        .await
}

/// Poll shared storage for both sentinel files, then assemble the result.
async fn wait_for_artifacts(
    request: &LaunchRequest,
    handle: &BatchHandle,
    marker: &str,
    poll_interval: Duration,
    file_timeout: Duration,
) -> ExecutionResult {
    let deadline = Instant::now() + file_timeout;
    let mut raw = FileWait::Missing;
    let mut result = FileWait::Missing;

    loop {
        if !raw.is_complete() {
            raw = poll_binary_file(&handle.output_path, marker.as_bytes());
        }
        if !result.is_complete() {
            result = poll_text_file(&handle.result_path, marker);
        }
        if raw.is_complete() && result.is_complete() {
            break;
        }

        if Instant::now() >= deadline {
            let diagnostic = file_wait_diagnostic(&[
                (&handle.output_path, &raw),
                (&handle.result_path, &result),
            ]);
            warn!(job = %request.name, "timed out waiting for batch output files");
            return ExecutionResult {
                outcome: ExecutionOutcome::TimedOut,
                output: diagnostic,
                duration: None,
            };
        }

        tokio::time::sleep(poll_interval).await;
    }

    let output = strip_mpi_abort_nul(&raw.take_content());
    let result_text = result.take_content();

    let parsed: BatchResult = match serde_json::from_str(&result_text) {
        Ok(parsed) => parsed,
        Err(err) => {
            return ExecutionResult::error(
                format!(
                    "unreadable batch result file {}: {err}",
                    handle.result_path.display()
                ),
                output,
            );
        }
    };

    // A negative or non-finite walltime is as unusable as unparsable JSON.
    let walltime = match Duration::try_from_secs_f64(parsed.walltime) {
        Ok(walltime) => walltime,
        Err(_) => {
            return ExecutionResult::error(
                format!(
                    "batch result file {} reports invalid walltime {}",
                    handle.result_path.display(),
                    parsed.walltime
                ),
                output,
            );
        }
    };

    ExecutionResult {
        outcome: ExecutionOutcome::Exited(parsed.exit_code),
        output,
        duration: Some(walltime),
    }
}

/// Where one polled artifact currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileWait {
    /// Not on disk at all yet.
    Missing,
    /// On disk, but the terminator marker has not appeared.
    Incomplete,
    /// Fully flushed; content with the marker stripped.
    Complete(String),
}

impl FileWait {
    fn is_complete(&self) -> bool {
        matches!(self, FileWait::Complete(_))
    }

    fn take_content(self) -> String {
        match self {
            FileWait::Complete(content) => content,
            _ => String::new(),
        }
    }
}

/// Check a text artifact: complete once the marker is its final line.
fn poll_text_file(path: &Path, marker: &str) -> FileWait {
    let Ok(content) = std::fs::read_to_string(path) else {
        return FileWait::Missing;
    };
    let trimmed = content.strip_suffix('\n').unwrap_or(&content);
    if trimmed == marker {
        return FileWait::Complete(String::new());
    }
    match trimmed
        .strip_suffix(marker)
        .and_then(|rest| rest.strip_suffix('\n'))
    {
        Some(body) => FileWait::Complete(format!("{body}\n")),
        None => FileWait::Incomplete,
    }
}

/// Check a binary artifact: complete once the fixed-length marker sits at
/// the tail (an optional trailing newline after the marker is tolerated).
fn poll_binary_file(path: &Path, marker: &[u8]) -> FileWait {
    let Ok(bytes) = std::fs::read(path) else {
        return FileWait::Missing;
    };
    let bytes: &[u8] = match bytes.strip_suffix(b"\n") {
        Some(stripped) if stripped.ends_with(marker) => stripped,
        _ => &bytes,
    };
    match bytes.strip_suffix(marker) {
        Some(body) => FileWait::Complete(String::from_utf8_lossy(body).into_owned()),
        None => FileWait::Incomplete,
    }
}

/// Diagnostic block for a file-wait timeout: which artifacts never
/// appeared, and which appeared but never carried the terminator.
fn file_wait_diagnostic(entries: &[(&Path, &FileWait)]) -> String {
    let mut out = header("Timed out waiting for batch output files");
    for (path, state) in entries {
        match state {
            FileWait::Missing => {
                out.push_str(&format!("never appeared: {}\n", path.display()));
            }
            FileWait::Incomplete => {
                out.push_str(&format!(
                    "appeared but incomplete (no terminator): {}\n",
                    path.display()
                ));
            }
            FileWait::Complete(_) => {
                out.push_str(&format!("complete: {}\n", path.display()));
            }
        }
    }
    out
}

/// An MPI collective abort can leave a stray NUL byte right after the
/// divider line in the captured output. Strip the first such byte only;
/// later NULs are the job's own problem.
fn strip_mpi_abort_nul(output: &str) -> String {
    static DIVIDER_NUL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(-{20,}\r?\n)\x00").expect("static pattern"));
    DIVIDER_NUL.replacen(output, 1, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MARKER: &str = "TESTDAG: ending comment";

    #[test]
    fn text_file_complete_only_with_marker_as_final_line() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("result.json");

        assert_eq!(poll_text_file(&path, MARKER), FileWait::Missing);

        std::fs::write(&path, "{\"exit_code\": 0, \"walltime\": 1.5}\n")?;
        assert_eq!(poll_text_file(&path, MARKER), FileWait::Incomplete);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path)?;
        writeln!(f, "{MARKER}")?;
        let FileWait::Complete(body) = poll_text_file(&path, MARKER) else {
            panic!("expected complete file");
        };
        assert_eq!(body, "{\"exit_code\": 0, \"walltime\": 1.5}\n");
        Ok(())
    }

    #[test]
    fn binary_file_complete_with_marker_at_tail() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("job.out");

        std::fs::write(&path, b"partial write")?;
        assert_eq!(poll_binary_file(&path, MARKER.as_bytes()), FileWait::Incomplete);

        std::fs::write(&path, format!("all output\n{MARKER}"))?;
        let FileWait::Complete(body) = poll_binary_file(&path, MARKER.as_bytes()) else {
            panic!("expected complete file");
        };
        assert_eq!(body, "all output\n");
        Ok(())
    }

    #[test]
    fn mpi_abort_nul_is_stripped_once() {
        let divider = "-".repeat(70);
        let input = format!("before\n{divider}\n\0after\n{divider}\n\0again\n");
        let cleaned = strip_mpi_abort_nul(&input);
        assert_eq!(
            cleaned,
            format!("before\n{divider}\nafter\n{divider}\n\0again\n")
        );
    }

    #[test]
    fn diagnostic_distinguishes_missing_from_incomplete() {
        let missing = FileWait::Missing;
        let incomplete = FileWait::Incomplete;
        let text = file_wait_diagnostic(&[
            (Path::new("/tmp/a.out"), &missing),
            (Path::new("/tmp/a.json"), &incomplete),
        ]);
        assert!(text.contains("never appeared: /tmp/a.out"));
        assert!(text.contains("incomplete (no terminator): /tmp/a.json"));
    }
}
