use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::{
    feed::framing::FrameError,
    headers::HeaderError,
    model::EncodeError,
};

/// Unified error for a feed write.
///
/// Encode failures never cross a task boundary on their own; they are gathered at
/// the barrier and surface here as `PartialBatchFailure`. Framing misuse is not an
/// error value: the envelope panics on it.
#[derive(Debug, Error)]
pub enum FeedError {
    /// One or more records failed to encode. `failures` holds every failing record
    /// when all errors are collected, otherwise only the first by index.
    #[error("{failed} of {total} records failed to encode; first: {}", first_failure(.failures))]
    PartialBatchFailure {
        failures: Vec<EncodeError>,
        failed: usize,
        total: usize,
    },

    /// The batch deadline passed before every record was encoded.
    #[error("batch timed out after {elapsed:?} (limit {limit:?}); {completed} of {total} records encoded")]
    BarrierTimeout {
        limit: Duration,
        elapsed: Duration,
        completed: usize,
        total: usize,
    },

    /// Invalid write configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn first_failure(failures: &[EncodeError]) -> String {
    failures
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none recorded".into())
}

impl FeedError {
    /// Indices of the failing records carried by this error.
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            FeedError::PartialBatchFailure { failures, .. } => failures.iter().map(|f| f.index).collect(),
            _ => Vec::new(),
        }
    }
}
