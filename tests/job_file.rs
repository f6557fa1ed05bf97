// tests/job_file.rs

//! TOML job list loading wired through a full scheduler run.

use std::sync::Arc;
use std::time::Duration;

use testdag::dag::JobDag;
use testdag::exec::LocalRunner;
use testdag::sched::{Scheduler, SchedulerConfig, SlotLimit};
use testdag::spec::load_specs;
use testdag::status::Status;

#[tokio::test]
async fn toml_job_list_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Testdag.toml");
    std::fs::write(
        &path,
        r#"
[job.prepare]
cmd = "true"

[job.build]
cmd = "true"
prereqs = ["prepare"]

[job.heavy]
cmd = "true"
processors = 2
threads = 2
max_time = 60

[job.disabled]
cmd = "false"
runnable = false
"#,
    )
    .unwrap();

    let specs = load_specs(&path).unwrap();
    assert_eq!(specs.len(), 4);

    let heavy = specs.iter().find(|s| s.name() == "heavy").unwrap();
    assert_eq!(heavy.slots(), 4);
    assert_eq!(heavy.max_time(), Duration::from_secs(60));

    let mut dag = JobDag::new();
    for spec in specs {
        dag.add_job(spec);
    }
    let cfg = SchedulerConfig {
        slot_limit: SlotLimit::Soft(4),
        poll_interval: Duration::from_millis(20),
        ..SchedulerConfig::default()
    };
    let runner = Arc::new(LocalRunner::new(64 * 1024));
    let report = Scheduler::new(dag, cfg, runner).run().await;

    assert_eq!(report.passed, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.exit_code(), 0);

    let disabled = report
        .jobs
        .iter()
        .find(|j| j.name == "disabled")
        .unwrap();
    assert_eq!(disabled.status, Status::Skip);
    assert_eq!(disabled.message, "not runnable");
}
