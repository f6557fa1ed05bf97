// tests/graph_validation.rs

//! Graph construction and validation: unknown dependencies, cycle
//! refusal, ready-set progression and flattening.

use std::sync::Arc;

use testdag::dag::JobDag;
use testdag::spec::TestSpec;
use testdag::status::Status;

fn spec(name: &str) -> TestSpec {
    TestSpec::new(name, "suite", "true")
}

#[test]
fn unknown_dependency_errors_the_job_only() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_prereqs(&["ghost"])));
    let b = dag.add_job(Arc::new(spec("b")));

    dag.resolve_dependencies();

    assert_eq!(dag.job(a).status(), Status::Error);
    assert_eq!(dag.job(a).message(), "unknown dependency 'ghost'");
    assert_eq!(dag.job(b).status(), Status::Hold);
}

#[test]
fn cycle_errors_both_endpoints_and_spares_the_rest() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_prereqs(&["b"])));
    let b = dag.add_job(Arc::new(spec("b").with_prereqs(&["a"])));
    let c = dag.add_job(Arc::new(spec("c")));

    dag.resolve_dependencies();

    assert_eq!(dag.job(a).status(), Status::Error);
    assert_eq!(dag.job(b).status(), Status::Error);
    assert!(dag.job(a).message().starts_with("cyclic dependency:"));
    assert!(dag.job(b).message().starts_with("cyclic dependency:"));
    assert_eq!(dag.job(c).status(), Status::Hold);
}

#[test]
fn self_dependency_is_a_cycle() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a").with_prereqs(&["a"])));

    dag.resolve_dependencies();

    assert_eq!(dag.job(a).status(), Status::Error);
    assert!(dag.job(a).message().contains("cyclic dependency"));
}

#[test]
fn duplicate_job_name_errors_the_second_entry() {
    let mut dag = JobDag::new();
    let first = dag.add_job(Arc::new(spec("a")));
    let second = dag.add_job(Arc::new(spec("a")));

    assert_eq!(dag.job(first).status(), Status::Hold);
    assert_eq!(dag.job(second).status(), Status::Error);
    assert_eq!(dag.job(second).message(), "duplicate job name");
}

#[test]
fn ready_set_progresses_in_dependency_order() {
    // a -> b -> c, with d independent.
    let mut dag = JobDag::new();
    dag.add_job(Arc::new(spec("a")));
    dag.add_job(Arc::new(spec("b").with_prereqs(&["a"])));
    dag.add_job(Arc::new(spec("c").with_prereqs(&["b"])));
    dag.add_job(Arc::new(spec("d")));
    dag.resolve_dependencies();

    let mut visited = Vec::new();
    loop {
        let ready = dag.advance();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            visited.push(dag.job(id).name().to_string());
            dag.job_mut(id).set_terminal(Status::Success, "");
        }
    }

    assert_eq!(visited.len(), 4);
    let pos = |n: &str| visited.iter().position(|v| v == n).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
    assert!(dag.unfinished().is_empty());
}

#[test]
fn flatten_makes_every_job_ready_at_once() {
    let mut dag = JobDag::new();
    dag.add_job(Arc::new(spec("a")));
    dag.add_job(Arc::new(spec("b").with_prereqs(&["a"])));
    dag.add_job(Arc::new(spec("c").with_prereqs(&["b"])));
    dag.resolve_dependencies();

    let order = dag.flatten();
    assert_eq!(order.len(), 3);
    assert_eq!(dag.ready_jobs().len(), 3);
}

#[test]
fn upstreams_and_downstreams_use_the_original_edges() {
    let mut dag = JobDag::new();
    let a = dag.add_job(Arc::new(spec("a")));
    let b = dag.add_job(Arc::new(spec("b").with_prereqs(&["a"])));
    let c = dag.add_job(Arc::new(spec("c").with_prereqs(&["b"])));
    dag.resolve_dependencies();

    assert_eq!(dag.upstreams(b), vec![a]);
    assert_eq!(dag.downstreams(a), vec![b, c]);

    // Removing finished nodes from the live graph leaves the queries intact.
    dag.job_mut(a).set_terminal(Status::Success, "");
    dag.advance();
    assert_eq!(dag.upstreams(b), vec![a]);
}
