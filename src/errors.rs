// src/errors.rs

//! Crate-wide error types.
//!
//! The application layer uses `anyhow` with context, re-exported here;
//! the batch-system boundary gets a structured `thiserror` enum so
//! embedders can distinguish submission failures from status-poll
//! failures.

pub use anyhow::{Error, Result};

use thiserror::Error as ThisError;

/// Errors crossing the remote batch-system boundary.
#[derive(Debug, ThisError)]
pub enum BatchError {
    #[error("batch submission failed: {0}")]
    Submit(String),

    #[error("batch status query failed: {0}")]
    Query(String),

    #[error("batch cancellation failed: {0}")]
    Cancel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
