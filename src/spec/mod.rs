// src/spec/mod.rs

//! Inbound job-specification surface.
//!
//! The core consumes an already-resolved list of job specifications; it
//! does not know where they came from. [`JobSpec`] is the closed interface
//! every job kind implements, [`TestSpec`] is the concrete implementation
//! used by the binary and the tests, and [`loader`] reads a TOML job list
//! for the CLI front end.

pub mod loader;
pub mod model;

pub use loader::load_specs;
pub use model::{JobConfig, JobFile};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::status::Status;

/// Default maximum run time for a job.
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(300);

/// One schedulable unit of work, as declared by the caller.
///
/// Implementations must be cheap to query; the scheduler calls these
/// accessors repeatedly while polling.
pub trait JobSpec: Send + Sync {
    /// Unique name within its test directory.
    fn name(&self) -> &str;

    /// Directory the job runs in. `test_dir` + `name` is the unique key.
    fn test_dir(&self) -> &Path;

    /// Names of jobs (in the same test directory) that must finish first.
    fn prereqs(&self) -> &[String];

    /// Process count requested by the job.
    fn processors(&self) -> usize {
        1
    }

    /// Thread count requested by the job.
    fn threads(&self) -> usize {
        1
    }

    /// Concurrency budget consumed while the job runs.
    fn slots(&self) -> usize {
        self.processors().max(1) * self.threads().max(1)
    }

    /// Maximum wall time before the job is terminated and marked timeout.
    fn max_time(&self) -> Duration {
        DEFAULT_MAX_TIME
    }

    /// Whether the job can run at all in the current environment. A false
    /// value skips the job (and, by default, its dependents).
    fn runnable(&self) -> bool {
        true
    }

    /// Silent jobs are excluded from reports and do not count as failures.
    fn silent(&self) -> bool {
        false
    }

    /// Shell command line to execute.
    fn command(&self) -> String;

    /// Files this job is expected to write. Used for race validation only.
    fn output_files(&self) -> &[PathBuf] {
        &[]
    }

    /// The job's own pass/fail predicate: turn an exit code and captured
    /// output into a terminal status. The default treats exit 0 as a pass.
    fn classify(&self, exit_code: i32, output: &str) -> Status {
        let _ = output;
        if exit_code == 0 {
            Status::Success
        } else {
            Status::Fail
        }
    }
}

/// Concrete job specification backed by plain fields.
///
/// Constructed either from the TOML loader or directly (tests build these
/// with the `with_*` methods).
#[derive(Debug, Clone)]
pub struct TestSpec {
    name: String,
    test_dir: PathBuf,
    cmd: String,
    prereqs: Vec<String>,
    processors: usize,
    threads: usize,
    max_time: Duration,
    runnable: bool,
    silent: bool,
    expect_fail: bool,
    output_files: Vec<PathBuf>,
}

impl TestSpec {
    pub fn new(name: impl Into<String>, test_dir: impl Into<PathBuf>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test_dir: test_dir.into(),
            cmd: cmd.into(),
            prereqs: Vec::new(),
            processors: 1,
            threads: 1,
            max_time: DEFAULT_MAX_TIME,
            runnable: true,
            silent: false,
            expect_fail: false,
            output_files: Vec::new(),
        }
    }

    pub fn from_config(name: String, test_dir: PathBuf, cfg: JobConfig) -> Self {
        Self {
            name,
            test_dir,
            cmd: cfg.cmd,
            prereqs: cfg.prereqs,
            processors: cfg.processors,
            threads: cfg.threads,
            max_time: Duration::from_secs(cfg.max_time),
            runnable: cfg.runnable,
            silent: cfg.silent,
            expect_fail: cfg.expect_fail,
            output_files: cfg.output_files,
        }
    }

    pub fn with_prereqs(mut self, prereqs: &[&str]) -> Self {
        self.prereqs = prereqs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_slots(mut self, processors: usize, threads: usize) -> Self {
        self.processors = processors;
        self.threads = threads;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn not_runnable(mut self) -> Self {
        self.runnable = false;
        self
    }

    pub fn silenced(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn expecting_failure(mut self) -> Self {
        self.expect_fail = true;
        self
    }

    pub fn with_output_files(mut self, files: &[&str]) -> Self {
        self.output_files = files.iter().map(PathBuf::from).collect();
        self
    }
}

impl JobSpec for TestSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    fn prereqs(&self) -> &[String] {
        &self.prereqs
    }

    fn processors(&self) -> usize {
        self.processors
    }

    fn threads(&self) -> usize {
        self.threads
    }

    fn max_time(&self) -> Duration {
        self.max_time
    }

    fn runnable(&self) -> bool {
        self.runnable
    }

    fn silent(&self) -> bool {
        self.silent
    }

    fn command(&self) -> String {
        self.cmd.clone()
    }

    fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    fn classify(&self, exit_code: i32, _output: &str) -> Status {
        match (exit_code == 0, self.expect_fail) {
            (true, false) => Status::Success,
            (false, true) => Status::Success,
            (false, false) => Status::Fail,
            // Expected a failure but the command passed.
            (true, true) => Status::Fail,
        }
    }
}
