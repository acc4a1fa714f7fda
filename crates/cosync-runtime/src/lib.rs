//! # cosync-runtime
//!
//! Multi-threaded driver for cosync coroutines.
//!
//! - `config` - runtime configuration with environment overrides
//! - `parking` - idle worker sleep/wake (futex on Linux)
//! - `ready_queue` - global queue of runnable coroutines
//! - `worker` - worker thread pool
//! - `executor` - the [`Scheduler`](cosync_core::Scheduler) implementation

pub mod config;
pub mod parking;
pub mod ready_queue;
pub mod worker;
pub mod executor;

// Re-exports
pub use config::{ConfigError, RuntimeConfig};
pub use executor::Executor;
pub use parking::{new_parking, WorkerParking};
pub use ready_queue::ReadyQueue;
pub use worker::{current_worker_id, WorkerPool};
