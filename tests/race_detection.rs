// tests/race_detection.rs

//! Output-file collision validation: unordered writers race, ordered
//! producer/consumer chains are fine, and a job listing the same file
//! twice is a duplicate.

use std::sync::Arc;

use testdag::dag::JobDag;
use testdag::spec::TestSpec;
use testdag::status::Status;

fn spec(name: &str) -> TestSpec {
    TestSpec::new(name, "suite", "true")
}

#[test]
fn unordered_writers_of_the_same_file_both_error() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_output_files(&["out.e"])));
    let b = dag.add_job(Arc::new(spec("b").with_output_files(&["out.e"])));

    dag.resolve_dependencies();
    dag.detect_races();

    for id in [a, b] {
        assert_eq!(dag.job(id).status(), Status::Error);
        assert!(dag.job(id).message().contains("output file race condition"));
    }
}

#[test]
fn dependency_ordered_writers_do_not_race() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_output_files(&["out.e"])));
    let b = dag.add_job(Arc::new(
        spec("b").with_prereqs(&["a"]).with_output_files(&["out.e"]),
    ));

    dag.resolve_dependencies();
    dag.detect_races();

    assert_eq!(dag.job(a).status(), Status::Hold);
    assert_eq!(dag.job(b).status(), Status::Hold);
}

#[test]
fn same_file_listed_twice_is_a_duplicate_not_a_race() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_output_files(&["out.e", "out.e"])));

    dag.resolve_dependencies();
    dag.detect_races();

    assert_eq!(dag.job(a).status(), Status::Error);
    assert!(dag.job(a).message().contains("duplicate output files"));
}

#[test]
fn skipped_jobs_do_not_participate_in_races() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(
        spec("a").not_runnable().with_output_files(&["out.e"]),
    ));
    let b = dag.add_job(Arc::new(spec("b").with_output_files(&["out.e"])));

    dag.resolve_dependencies();
    dag.propagate_skips(true);
    dag.detect_races();

    assert_eq!(dag.job(a).status(), Status::Skip);
    assert_eq!(dag.job(b).status(), Status::Hold);
}
