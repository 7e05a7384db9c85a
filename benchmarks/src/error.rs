//! Error handling for Tickbench sessions
//!
//! Two layers of errors exist: [`StorageError`] is what a storage engine reports through
//! the engine contract, and [`BenchmarkError`] is what a session phase reports to its
//! caller. Cancellation is deliberately absent from both; it surfaces as
//! [`PhaseOutcome::Cancelled`](crate::session::PhaseOutcome::Cancelled).

use std::io;

use thiserror::Error;

use crate::session::{Phase, SessionState};

/// Errors raised by a storage engine implementation
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O errors from file-backed engines
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage engine is not initialized")]
    NotInitialized,

    #[error("Storage engine is already closed")]
    Closed,

    #[error("Flow index {index} is out of range for {flow_count} flows")]
    InvalidFlow { index: usize, flow_count: usize },

    #[error("Corrupted record in {location}: {reason}")]
    Corrupted { location: String, reason: String },

    /// Engine specific failures that do not fit another variant
    #[error("{0}")]
    Engine(String),
}

impl StorageError {
    pub fn engine(reason: impl Into<String>) -> Self {
        StorageError::Engine(reason.into())
    }
}

/// Errors raised by a benchmark session phase
#[derive(Error, Debug)]
pub enum BenchmarkError {
    /// The engine returned keys that were not strictly ascending.
    #[error("Keys are not ordered: key {key} follows {previous} after {records_read} records")]
    KeyOrderingViolation {
        previous: i64,
        key: i64,
        records_read: u64,
    },

    #[error("Storage engine failed during {phase}: {source}")]
    Backend {
        phase: Phase,
        #[source]
        source: StorageError,
    },

    #[error("Failed to release storage engine resources: {0}")]
    ResourceRelease(#[source] StorageError),

    #[error("Worker task for {phase} did not complete: {source}")]
    Worker {
        phase: Phase,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("Invalid phase transition: expected session in {expected}, found {actual}")]
    InvalidTransition {
        expected: SessionState,
        actual: SessionState,
    },
}

impl BenchmarkError {
    /// Whether this error means the engine returned an unordered read stream
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, BenchmarkError::KeyOrderingViolation { .. })
    }

    /// Short, stable label used by metrics and reports
    pub fn kind(&self) -> &'static str {
        match self {
            BenchmarkError::KeyOrderingViolation { .. } => "key_ordering_violation",
            BenchmarkError::Backend { .. } => "backend_failure",
            BenchmarkError::ResourceRelease(_) => "resource_release_failure",
            BenchmarkError::Worker { .. } => "worker_failure",
            BenchmarkError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub type Result<T> = std::result::Result<T, BenchmarkError>;
