// src/sched/mod.rs

//! Scheduling layer.
//!
//! [`scheduler`] owns the coordinating loop (slot accounting, load
//! backpressure, oversized-job handling, final reconciliation);
//! [`load`] samples the system load average for backpressure.

pub mod load;
pub mod scheduler;

pub use scheduler::{JobOutcome, RunReport, Scheduler, SchedulerConfig, SlotLimit};
