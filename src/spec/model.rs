// src/spec/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Top-level job list as read from a TOML file.
///
/// ```toml
/// [job.a]
/// cmd = "echo a"
///
/// [job.b]
/// cmd = "echo b"
/// prereqs = ["a"]
/// processors = 2
/// max_time = 60
/// output_files = ["b.csv"]
/// ```
///
/// Keys under `[job.<name>]` are the job names. A `BTreeMap` makes the
/// iteration order deterministic (sorted by name); ordering between jobs
/// is expressed through `prereqs`, never through declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// One `[job.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Shell command line to run.
    pub cmd: String,

    /// Names of jobs that must finish before this one starts.
    #[serde(default)]
    pub prereqs: Vec<String>,

    #[serde(default = "default_one")]
    pub processors: usize,

    #[serde(default = "default_one")]
    pub threads: usize,

    /// Maximum run time in seconds.
    #[serde(default = "default_max_time")]
    pub max_time: u64,

    /// Set false to skip the job (and by default its dependents).
    #[serde(default = "default_true")]
    pub runnable: bool,

    /// Silent jobs are excluded from reports and never count as failures.
    #[serde(default)]
    pub silent: bool,

    /// Invert the pass predicate: a non-zero exit is the expected outcome.
    #[serde(default)]
    pub expect_fail: bool,

    /// Files this job writes, relative to its test directory.
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
}

fn default_one() -> usize {
    1
}

fn default_max_time() -> u64 {
    300
}

fn default_true() -> bool {
    true
}
