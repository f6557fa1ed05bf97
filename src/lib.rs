// src/lib.rs

pub mod cli;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod job;
pub mod logging;
pub mod sched;
pub mod spec;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::CliArgs;
use crate::dag::JobDag;
use crate::exec::LocalRunner;
use crate::sched::{JobOutcome, RunReport, Scheduler, SchedulerConfig, SlotLimit};
use crate::spec::JobSpec;
use crate::status::Status;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job-list loading
/// - the dependency graph
/// - the scheduler with a local process runner
/// - result reporting
///
/// Returns the process exit code: 0 when every job passed or was skipped.
pub async fn run(args: CliArgs) -> Result<i32> {
    let path = PathBuf::from(&args.jobs_file);
    let specs = spec::load_specs(&path)?;

    if args.dry_run {
        print_dry_run(&specs);
        return Ok(0);
    }

    let mut dag = JobDag::with_output_limit(args.output_limit);
    for spec in specs {
        dag.add_job(spec);
    }

    let budget = args.slots.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let slot_limit = if args.hard_limit {
        SlotLimit::Hard(budget)
    } else {
        SlotLimit::Soft(budget)
    };
    let cfg = SchedulerConfig {
        slot_limit,
        load_ceiling: args.load,
        skip_unsatisfied_deps: !args.no_skip_deps,
        flatten: args.no_deps,
        ..SchedulerConfig::default()
    };

    let runner = Arc::new(LocalRunner::new(args.output_limit));
    let report = Scheduler::new(dag, cfg, runner).run().await;

    print_report(&report);
    Ok(report.exit_code())
}

/// Print one row per job plus the aggregate counts. Silent jobs are
/// suppressed entirely.
fn print_report(report: &RunReport) {
    for outcome in &report.jobs {
        if outcome.status == Status::Silent {
            continue;
        }
        println!("{}", format_row(outcome));
    }
    println!();
    println!(
        "{} passed, {} skipped, {} failed",
        report.passed, report.skipped, report.failed
    );
}

const ROW_WIDTH: usize = 79;

fn format_row(outcome: &JobOutcome) -> String {
    let mut left = outcome.key.clone();
    if !outcome.caveats.is_empty() {
        left.push_str(&format!(" [{}]", outcome.caveats.join(",")));
    }
    let mut right = outcome.status.label().to_string();
    if !outcome.message.is_empty() {
        right.push_str(&format!(": {}", outcome.message));
    }
    let dots = ROW_WIDTH
        .saturating_sub(left.len() + right.len() + 2)
        .max(2);
    format!(
        "{left} {} {}{right}\x1b[0m ({:.2}s)",
        ".".repeat(dots),
        outcome.status.color(),
        outcome.duration.as_secs_f64()
    )
}

/// Simple dry-run output: print jobs, prereqs and commands.
fn print_dry_run(specs: &[Arc<dyn JobSpec>]) {
    println!("testdag dry-run");
    println!();
    println!("jobs ({}):", specs.len());
    for spec in specs {
        println!("  - {}", spec.name());
        println!("      cmd: {}", spec.command());
        if !spec.prereqs().is_empty() {
            println!("      prereqs: {:?}", spec.prereqs());
        }
        if spec.slots() != 1 {
            println!("      slots: {}", spec.slots());
        }
        println!("      max_time: {}s", spec.max_time().as_secs());
        if !spec.runnable() {
            println!("      runnable: false");
        }
        if !spec.output_files().is_empty() {
            println!("      output_files: {:?}", spec.output_files());
        }
    }
}
