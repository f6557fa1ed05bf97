// src/exec/mod.rs

//! Job execution layer.
//!
//! The scheduler hands [`backend::LaunchRequest`]s to a
//! [`backend::JobRunner`] and gets exactly one
//! [`backend::RunnerEvent::Completed`] back per job.
//!
//! - [`local`] runs jobs as OS processes with process-group timeout kills.
//! - [`hpc`] submits jobs to a remote batch scheduler and reconciles
//!   file-based completion signals.
//! - [`output`] bounds captured output (head + tail, middle elided).

pub mod backend;
pub mod hpc;
pub mod local;
pub mod output;

pub use backend::{ExecutionOutcome, ExecutionResult, JobRunner, LaunchRequest, RunnerEvent};
pub use hpc::{BatchHandle, BatchResult, BatchState, BatchSystem, HpcRunner};
pub use local::LocalRunner;
