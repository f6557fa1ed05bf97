// src/dag/mod.rs

//! Dependency graph over jobs.
//!
//! [`graph`] owns the job arena and the adjacency information: dependency
//! resolution, cycle refusal, skip propagation, output-race detection and
//! the ready-set bookkeeping the scheduler drives the run with.

pub mod graph;

pub use graph::{JobDag, JobId};
