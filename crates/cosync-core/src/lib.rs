//! # cosync-core
//!
//! Coroutine records and the synchronization primitives that suspend them.
//!
//! Nothing here runs a coroutine. A coroutine is a record plus an entry
//! function that is stepped by some [`Scheduler`]; the primitives in this
//! crate decide whether a step would block, park the record on a wait list,
//! and hand it back to the scheduler when it may continue. The threaded
//! driver lives in `cosync-runtime`.
//!
//! ## Modules
//!
//! - `id` - coroutine identifier
//! - `state` - run state and the step result of an entry function
//! - `mayblock` - outcome of a wait
//! - `record` - coroutine records (plain and linked)
//! - `arena` - fixed-capacity record storage
//! - `soft_mutex` - spin-then-yield lock
//! - `condvar` - thread-safe wait lists
//! - `semaphore` - thread-safe counting semaphores
//! - `local` - single-thread semaphores and condition variables
//! - `traits` - the scheduler seam
//! - `error` - error types
//! - `kprint` - leveled stderr logging macros
//! - `env` - environment variable helpers

pub mod kprint;
pub mod env;
pub mod id;
pub mod state;
pub mod mayblock;
pub mod error;
pub mod soft_mutex;
pub mod record;
pub mod arena;
pub mod traits;
pub mod condvar;
pub mod semaphore;
pub mod local;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use id::CoroutineId;
pub use state::{CoroutineState, Step};
pub use mayblock::MayBlock;
pub use error::{CoError, CoResult, WorkerError};
pub use soft_mutex::{SoftMutex, SoftMutexGuard};
pub use record::{Coroutine, EntryFn, PlainCoroutine, RESUME_START};
pub use arena::{Ancestors, RecordArena};
pub use traits::Scheduler;
pub use condvar::{ConditionVariable, FifoConditionVariable, WaitList};
pub use semaphore::{
    FifoSemaphore, RawFifoSemaphore, RawSemaphore, RawSemaphoreBase, Semaphore, SemaphoreBase,
    WaitCall,
};
pub use local::{
    LocalConditionVariable, LocalFifoConditionVariable, LocalFifoSemaphore, LocalNotify,
    LocalSemaphore, LocalWaitList, RawLocalFifoSemaphore, RawLocalSemaphore,
};
pub use env::{env_get, env_get_bool, env_get_opt, env_parse, EnvParseError};

/// Shared constants
pub mod constants {
    /// Sentinel for "no coroutine" in links and wait lists
    pub const COROUTINE_NONE: u32 = u32::MAX;

    /// Default record arena capacity
    pub const DEFAULT_MAX_COROUTINES: usize = 4096;

    /// Upper bound on worker threads
    pub const MAX_WORKERS: usize = 64;
}
