//! Library defaults, used when no `COSYNC_*` override is set

use cosync_core::constants::DEFAULT_MAX_COROUTINES;

pub const NUM_WORKERS: usize = 4;

pub const MAX_COROUTINES: usize = DEFAULT_MAX_COROUTINES;

/// Empty polls of the ready queue before a worker parks
pub const IDLE_SPINS: u32 = 64;

/// Upper bound on a single park; workers re-check shutdown at least this often
pub const PARK_TIMEOUT_MS: u64 = 10;

pub const DEBUG_LOGGING: bool = false;
