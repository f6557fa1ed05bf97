// src/job.rs

//! The `Job` container: one schedulable unit wrapping a [`JobSpec`] with
//! status, timing, captured output and caveats.
//!
//! Jobs are owned by the [`crate::dag::JobDag`] arena and mutated only by
//! the coordinating scheduler loop. The one exception is the status, which
//! lives behind an `Arc<StatusSystem>` so a runner task can flip
//! `Queued` → `Running` while the coordinator polls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dag::JobId;
use crate::exec::output::OutputBuffer;
use crate::spec::JobSpec;
use crate::status::{Status, StatusSystem};

pub struct Job {
    id: JobId,
    spec: Arc<dyn JobSpec>,
    status: Arc<StatusSystem>,
    /// First meaningful status message wins; later ones are dropped so the
    /// original cause of a failure is not overwritten.
    message: String,
    caveats: Vec<String>,
    output: OutputBuffer,
    start: Option<Instant>,
    end: Option<Instant>,
    /// Measured wall time reported by a remote batch system. More accurate
    /// than coordinator-side clock timing across queueing delays.
    walltime: Option<Duration>,
}

impl Job {
    pub fn new(id: JobId, spec: Arc<dyn JobSpec>, output_limit: usize) -> Self {
        Self {
            id,
            spec,
            status: Arc::new(StatusSystem::new()),
            message: String::new(),
            caveats: Vec::new(),
            output: OutputBuffer::new(output_limit),
            start: None,
            end: None,
            walltime: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn spec(&self) -> &dyn JobSpec {
        self.spec.as_ref()
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Unique key: test directory + job name.
    pub fn key(&self) -> String {
        self.spec.test_dir().join(self.spec.name()).display().to_string()
    }

    /// Prerequisite names resolved to unique keys within the same test
    /// directory.
    pub fn prereq_keys(&self) -> Vec<String> {
        self.spec
            .prereqs()
            .iter()
            .map(|p| self.spec.test_dir().join(p).display().to_string())
            .collect()
    }

    pub fn slots(&self) -> usize {
        self.spec.slots()
    }

    pub fn max_time(&self) -> Duration {
        self.spec.max_time()
    }

    /// Output file paths resolved against the test directory.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.spec
            .output_files()
            .iter()
            .map(|f| {
                if f.is_absolute() {
                    f.clone()
                } else {
                    self.spec.test_dir().join(f)
                }
            })
            .collect()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Shared handle to the status, for runner tasks.
    pub fn status_handle(&self) -> Arc<StatusSystem> {
        Arc::clone(&self.status)
    }

    /// Finalize with a terminal status and message. Ignored if the job is
    /// already finished.
    pub fn set_terminal(&mut self, status: Status, message: impl Into<String>) {
        debug_assert!(status.is_finished());
        if self.status.get().is_finished() {
            return;
        }
        let message = message.into();
        if self.message.is_empty() && !message.is_empty() {
            self.message = message;
        }
        self.status.set(status);
    }

    pub fn set_queued(&mut self) {
        self.status.set(Status::Queued);
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn add_caveat(&mut self, caveat: impl Into<String>) {
        let caveat = caveat.into();
        if !self.caveats.contains(&caveat) {
            self.caveats.push(caveat);
        }
    }

    pub fn caveats(&self) -> &[String] {
        &self.caveats
    }

    pub fn append_output(&mut self, text: &str) {
        self.output.push_text(text);
    }

    pub fn output(&self) -> String {
        self.output.render()
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn mark_started(&mut self) {
        self.start = Some(Instant::now());
    }

    pub fn mark_finished(&mut self) {
        if self.end.is_none() {
            self.end = Some(Instant::now());
        }
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.start
    }

    pub fn set_walltime(&mut self, walltime: Duration) {
        self.walltime = Some(walltime);
    }

    /// Best available measure of how long the job ran: a remote-reported
    /// wall time wins over coordinator clock timing; a still-running job
    /// reports its elapsed time so far.
    pub fn timing(&self) -> Duration {
        if let Some(walltime) = self.walltime {
            return walltime;
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TestSpec;

    fn job(spec: TestSpec) -> Job {
        Job::new(JobId(0), Arc::new(spec), 4096)
    }

    #[test]
    fn key_combines_dir_and_name() {
        let j = job(TestSpec::new("basic", "tests/foo", "true"));
        assert_eq!(j.key(), "tests/foo/basic");
    }

    #[test]
    fn first_message_is_preserved() {
        let mut j = job(TestSpec::new("basic", ".", "true"));
        j.set_terminal(Status::Error, "unknown dependency 'x'");
        j.set_terminal(Status::Skip, "later message");
        assert_eq!(j.status(), Status::Error);
        assert_eq!(j.message(), "unknown dependency 'x'");
    }

    #[test]
    fn walltime_overrides_clock_timing() {
        let mut j = job(TestSpec::new("basic", ".", "true"));
        j.mark_started();
        j.mark_finished();
        j.set_walltime(Duration::from_secs_f64(12.5));
        assert_eq!(j.timing(), Duration::from_secs_f64(12.5));
    }
}
