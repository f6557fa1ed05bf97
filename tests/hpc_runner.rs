// tests/hpc_runner.rs

//! HPC backend reconciliation against a faked batch system that writes
//! its artifacts to a temporary directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use testdag::dag::JobDag;
use testdag::errors::BatchError;
use testdag::exec::{BatchHandle, BatchState, BatchSystem, HpcRunner};
use testdag::sched::{RunReport, Scheduler, SchedulerConfig, SlotLimit};
use testdag::spec::TestSpec;
use testdag::status::Status;

const MARKER: &str = "TESTDAG: ending comment";

/// Batch system that "runs" the job at submission time: it writes both
/// sentinel artifacts immediately (unless told to withhold them) and then
/// reports the job as done.
struct FakeBatch {
    dir: PathBuf,
    exit_code: i32,
    walltime: f64,
    produce_files: bool,
}

impl BatchSystem for FakeBatch {
    fn submit(&self, _name: &str, command: &str) -> Result<BatchHandle, BatchError> {
        let output_path = self.dir.join("job.out");
        let result_path = self.dir.join("job.json");
        if self.produce_files {
            std::fs::write(&output_path, format!("ran: {command}\n{MARKER}"))?;
            std::fs::write(
                &result_path,
                format!(
                    "{{\"exit_code\": {}, \"walltime\": {}}}\n{MARKER}\n",
                    self.exit_code, self.walltime
                ),
            )?;
        }
        Ok(BatchHandle {
            id: "12345".to_string(),
            output_path,
            result_path,
        })
    }

    fn state(&self, _handle: &BatchHandle) -> Result<BatchState, BatchError> {
        Ok(BatchState::Done)
    }

    fn cancel(&self, _handle: &BatchHandle) -> Result<(), BatchError> {
        Ok(())
    }

    fn ending_comment(&self) -> String {
        MARKER.to_string()
    }
}

async fn run_one(batch: FakeBatch, file_timeout: Duration) -> RunReport {
    let mut dag = JobDag::new();
    dag.add_job(Arc::new(TestSpec::new("remote", "suite", "echo payload")));

    let runner = Arc::new(HpcRunner::new(
        Arc::new(batch),
        Duration::from_millis(10),
        file_timeout,
    ));
    let cfg = SchedulerConfig {
        slot_limit: SlotLimit::Soft(1),
        poll_interval: Duration::from_millis(20),
        ..SchedulerConfig::default()
    };
    Scheduler::new(dag, cfg, runner).run().await
}

#[tokio::test]
async fn completed_batch_job_reports_exit_code_and_walltime() {
    let dir = tempfile::tempdir().unwrap();
    let batch = FakeBatch {
        dir: dir.path().to_path_buf(),
        exit_code: 0,
        walltime: 2.5,
        produce_files: true,
    };

    let report = run_one(batch, Duration::from_secs(5)).await;

    let job = report.outcome("suite/remote").unwrap();
    assert_eq!(job.status, Status::Success);
    assert!(job.output.contains("ran: echo payload"));
    // Remote-reported walltime wins over coordinator clock timing.
    assert_eq!(job.duration, Duration::from_secs_f64(2.5));
}

#[tokio::test]
async fn nonzero_remote_exit_code_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let batch = FakeBatch {
        dir: dir.path().to_path_buf(),
        exit_code: 7,
        walltime: 0.1,
        produce_files: true,
    };

    let report = run_one(batch, Duration::from_secs(5)).await;

    let job = report.outcome("suite/remote").unwrap();
    assert_eq!(job.status, Status::Fail);
    assert_eq!(job.message, "exit code 7");
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn negative_walltime_errors_the_job_instead_of_hanging() {
    let dir = tempfile::tempdir().unwrap();
    let batch = FakeBatch {
        dir: dir.path().to_path_buf(),
        exit_code: 0,
        walltime: -1.0,
        produce_files: true,
    };

    // The run must still terminate: the runner has to report a completion
    // even when the result file is unusable.
    let report = tokio::time::timeout(Duration::from_secs(5), run_one(batch, Duration::from_secs(5)))
        .await
        .expect("scheduler finishes despite a malformed result file");

    let job = report.outcome("suite/remote").unwrap();
    assert_eq!(job.status, Status::Error);
    assert!(job.message.contains("invalid walltime"));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn missing_artifacts_time_out_with_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let batch = FakeBatch {
        dir: dir.path().to_path_buf(),
        exit_code: 0,
        walltime: 0.0,
        produce_files: false,
    };

    let report = run_one(batch, Duration::from_millis(150)).await;

    let job = report.outcome("suite/remote").unwrap();
    assert_eq!(job.status, Status::Timeout);
    assert!(job.output.contains("never appeared"));
    assert!(job.output.contains("job.out"));
    assert!(job.output.contains("job.json"));
}
