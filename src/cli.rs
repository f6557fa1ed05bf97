// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `testdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "testdag",
    version,
    about = "Run a list of test jobs concurrently under dependency, slot and load constraints.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job list (TOML).
    ///
    /// Default: `Testdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Testdag.toml")]
    pub jobs_file: String,

    /// Concurrency budget in slots (processes × threads).
    ///
    /// Defaults to the number of available CPUs.
    #[arg(short = 'j', long, value_name = "N")]
    pub slots: Option<usize>,

    /// Treat the slot budget as a hard limit: jobs whose cost exceeds it
    /// are skipped instead of run alone after the queue drains.
    #[arg(long)]
    pub hard_limit: bool,

    /// Do not launch additional jobs while the 1-minute load average is at
    /// least LOAD.
    #[arg(short = 'l', long = "load-average", value_name = "LOAD")]
    pub load: Option<f64>,

    /// Do not skip jobs whose prerequisites were skipped or failed; let
    /// them run independently.
    #[arg(long)]
    pub no_skip_deps: bool,

    /// Ignore dependency ordering entirely and run every job (diagnostic
    /// re-execution of a previous run).
    #[arg(long)]
    pub no_deps: bool,

    /// Byte ceiling for captured output per job (head and tail are kept,
    /// the middle is elided).
    #[arg(long, value_name = "BYTES", default_value_t = 100_000)]
    pub output_limit: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TESTDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse and validate the job list, print the graph, but don't execute
    /// any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
