//! # cosync - stackless coroutines that synchronize across threads
//!
//! A coroutine is a record in a [`RecordArena`] plus a plain entry function.
//! Each call of the function is one *step*: it reads the record's resume
//! point, runs to the next suspension point, saves where to continue and
//! returns a [`Step`]. Waiting on a [`Semaphore`] never blocks the OS
//! thread; it either takes a permit right away or queues the record and
//! tells the step to return [`Step::Suspend`]. A `notify` from any thread
//! later hands the permit over and makes the coroutine runnable again.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cosync::{Coroutine, MayBlock, Runtime, RuntimeConfig, Scheduler, Semaphore, Step};
//!
//! static READY: Semaphore = Semaphore::new(0);
//!
//! fn waiter(co: &Coroutine, sched: &dyn Scheduler) -> Step {
//!     match co.resume_point() {
//!         0 => {
//!             co.set_resume_point(1);
//!             match READY.wait().evaluate(sched, co) {
//!                 MayBlock::WouldBlock => Step::Suspend,
//!                 MayBlock::NoBlock => waiter(co, sched),
//!             }
//!         }
//!         _ => Step::Done,
//!     }
//! }
//!
//! fn main() {
//!     let mut runtime = Runtime::new(RuntimeConfig::from_env()).unwrap();
//!     runtime.block_on(|exec| {
//!         exec.spawn(waiter).unwrap();
//!         READY.notify(exec);
//!         exec.wait_all(std::time::Duration::from_secs(1))
//!     });
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  coroutine bodies: fn(&Coroutine, &dyn Scheduler) -> Step │
//! └──────────────────────────────────────────────────────────┘
//!          │ wait / notify                    ▲ step
//!          ▼                                  │
//! ┌─────────────────────────┐      ┌─────────────────────────┐
//! │ cosync-core             │ wake │ cosync-runtime          │
//! │ Semaphore, Condvar,     │─────>│ Executor, ReadyQueue,   │
//! │ records, arena          │      │ WorkerPool, parking     │
//! └─────────────────────────┘      └─────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

// Re-export core types
pub use cosync_core::{
    CoError,
    CoResult,
    Coroutine,
    CoroutineId,
    CoroutineState,
    EntryFn,
    MayBlock,
    PlainCoroutine,
    RecordArena,
    Scheduler,
    Step,
    WorkerError,
    RESUME_START,
    // Cross-thread primitives
    ConditionVariable,
    FifoConditionVariable,
    WaitList,
    Semaphore,
    FifoSemaphore,
    RawSemaphore,
    RawFifoSemaphore,
    SoftMutex,
    SoftMutexGuard,
    // Single-thread primitives
    LocalConditionVariable,
    LocalFifoConditionVariable,
    LocalNotify,
    LocalWaitList,
    LocalSemaphore,
    LocalFifoSemaphore,
    RawLocalSemaphore,
    RawLocalFifoSemaphore,
};

// Re-export kprint macros for debug logging
pub use cosync_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use cosync_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_time_enabled};

// Re-export env utilities
pub use cosync_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use cosync_runtime::{ConfigError, Executor, RuntimeConfig, WorkerPool};

/// Executor plus the worker threads driving it
///
/// Without [`start`](Self::start) nothing runs in the background; the
/// executor can still be stepped by hand with `run_until_idle`.
pub struct Runtime {
    executor: Arc<Executor>,
    pool: Option<WorkerPool>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            executor: Arc::new(Executor::new(config)?),
            pool: None,
        })
    }

    #[inline]
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Start the worker threads
    pub fn start(&mut self) -> CoResult<()> {
        if self.pool.is_some() {
            return Err(CoError::AlreadyInitialized);
        }
        self.pool = Some(self.executor.start()?);
        Ok(())
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.pool.is_some()
    }

    /// Start the workers, run `f`, then shut the workers down
    pub fn block_on<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce(&Arc<Executor>) -> T,
    {
        if let Err(e) = self.start() {
            kwarn!("runtime: start in block_on: {}", e);
        }
        let result = f(&self.executor);
        if let Err(e) = self.shutdown() {
            kerror!("runtime: shutdown: {}", e);
        }
        result
    }

    pub fn spawn(&self, entry: EntryFn) -> CoResult<CoroutineId> {
        self.executor.spawn(entry)
    }

    /// Wait until every spawned coroutine has finished
    pub fn wait_all(&self, timeout: Duration) -> bool {
        self.executor.wait_all(timeout)
    }

    /// Stop and join the workers; queued coroutines stay queued
    pub fn shutdown(&mut self) -> CoResult<()> {
        match self.pool.take() {
            Some(pool) => self.executor.shutdown(pool),
            None => Ok(()),
        }
    }
}

impl Scheduler for Runtime {
    #[inline]
    fn records(&self) -> &RecordArena {
        self.executor.records()
    }

    #[inline]
    fn wake(&self, id: CoroutineId) {
        self.executor.wake(id)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            kerror!("runtime: shutdown on drop: {}", e);
        }
    }
}
