// src/exec/local.rs

//! Local process execution backend.
//!
//! Each job runs as `sh -c <command>` in its own process group, with
//! stdout and stderr merged into a bounded [`OutputBuffer`]. A job that
//! outlives its maximum run time has its whole process group killed, so
//! grandchildren spawned by the test command cannot linger.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{ExecutionOutcome, ExecutionResult, JobRunner, LaunchRequest, RunnerEvent};
use super::output::{OutputBuffer, timeout_banner};
use crate::status::Status;

pub struct LocalRunner {
    output_limit: usize,
}

impl LocalRunner {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }
}

impl JobRunner for LocalRunner {
    fn launch(&self, request: LaunchRequest, events: mpsc::Sender<RunnerEvent>) {
        let output_limit = self.output_limit;
        tokio::spawn(async move {
            let id = request.id;
            let result = run_local(request, output_limit).await;
            // If the scheduler is gone there is nobody left to report to.
            let _ = events.send(RunnerEvent::Completed { id, result }).await;
        });
    }
}

async fn run_local(request: LaunchRequest, output_limit: usize) -> ExecutionResult {
    info!(job = %request.name, cmd = %request.command, "starting job process");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&request.command);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // A fresh process group lets the timeout path kill the whole tree.
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(job = %request.name, error = %err, "failed to spawn job process");
            return ExecutionResult::error(format!("failed to launch: {err}"), String::new());
        }
    };
    request.status.set(Status::Running);

    let buffer = Arc::new(Mutex::new(OutputBuffer::new(output_limit)));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(capture(stdout, Arc::clone(&buffer))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(capture(stderr, Arc::clone(&buffer))));
    }

    let pid = child.id();

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                debug!(job = %request.name, exit_code = code, "job process exited");
                ExecutionOutcome::Exited(code)
            }
            Err(err) => ExecutionOutcome::Error(format!("waiting for process: {err}")),
        },
        _ = tokio::time::sleep(request.max_time) => {
            warn!(
                job = %request.name,
                max_time = request.max_time.as_secs(),
                "job exceeded maximum run time; killing process group"
            );
            kill_process_group(pid);
            // Reap the child so the kill is not racing a zombie.
            let _ = child.wait().await;
            if let Ok(mut buf) = buffer.lock() {
                buf.push_text(&timeout_banner(request.max_time));
            }
            ExecutionOutcome::TimedOut
        }
    };

    // Readers end once the pipes close (the process group is dead by now).
    for reader in readers {
        let _ = reader.await;
    }

    let output = buffer
        .lock()
        .map(|buf| buf.render())
        .unwrap_or_default();

    ExecutionResult {
        outcome,
        output,
        duration: None,
    }
}

async fn capture<R: AsyncRead + Unpin>(stream: R, buffer: Arc<Mutex<OutputBuffer>>) {
    let reader = BufReader::new(stream);
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Ok(mut buf) = buffer.lock() {
            buf.push_line(&line);
        }
    }
}

fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // The child was spawned with process_group(0), so its pid is also
        // its process group id.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}
