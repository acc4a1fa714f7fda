//! Error types for record management and the runtime
//!
//! The synchronization primitives themselves have no error paths: misuse is
//! a programming error caught by debug assertions.

use core::fmt;

/// Result type for record and runtime operations
pub type CoResult<T> = Result<T, CoError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoError {
    /// Record arena is full
    NoSlotsAvailable,

    /// Record is in the wrong state for the operation
    InvalidState,

    /// Runtime not initialized
    NotInitialized,

    /// Runtime already started
    AlreadyInitialized,

    /// Worker thread error
    WorkerError(WorkerError),
}

impl fmt::Display for CoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoError::NoSlotsAvailable => write!(f, "no coroutine record slots available"),
            CoError::InvalidState => write!(f, "invalid coroutine state"),
            CoError::NotInitialized => write!(f, "runtime not initialized"),
            CoError::AlreadyInitialized => write!(f, "runtime already initialized"),
            CoError::WorkerError(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for CoError {}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn worker thread
    SpawnFailed,

    /// Worker thread panicked
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl From<WorkerError> for CoError {
    fn from(e: WorkerError) -> Self {
        CoError::WorkerError(e)
    }
}
