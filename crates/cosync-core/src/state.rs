//! Coroutine run state and step outcome types

use core::fmt;
use crate::id::CoroutineId;

/// Scheduling state of a coroutine record
///
/// Only schedulers write this; the synchronization primitives never look at
/// it. `Notified` exists because a semaphore may hand a waiter to
/// [`Scheduler::wake`](crate::traits::Scheduler::wake) before the waiter's
/// own step has returned `Step::Suspend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoroutineState {
    /// Prepared (or released) but never queued
    Idle = 0,

    /// In a ready queue
    Ready = 1,

    /// A step is executing on some thread
    Running = 2,

    /// Parked until something wakes it
    Suspended = 3,

    /// Woken while its step was still running
    Notified = 4,

    /// Body returned `Step::Done`
    Finished = 5,
}

impl CoroutineState {
    /// Check if a step may be started from this state
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, CoroutineState::Ready)
    }

    #[inline]
    pub const fn is_finished(&self) -> bool {
        matches!(self, CoroutineState::Finished)
    }
}

impl From<u8> for CoroutineState {
    fn from(v: u8) -> Self {
        match v {
            1 => CoroutineState::Ready,
            2 => CoroutineState::Running,
            3 => CoroutineState::Suspended,
            4 => CoroutineState::Notified,
            5 => CoroutineState::Finished,
            _ => CoroutineState::Idle,
        }
    }
}

impl From<CoroutineState> for u8 {
    fn from(state: CoroutineState) -> u8 {
        state as u8
    }
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoroutineState::Idle => "idle",
            CoroutineState::Ready => "ready",
            CoroutineState::Running => "running",
            CoroutineState::Suspended => "suspended",
            CoroutineState::Notified => "notified",
            CoroutineState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// What a coroutine body asks of its scheduler after one step
///
/// The body stores its next resume point in the record *before* returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting on a primitive that will call `wake` later
    Suspend,

    /// Re-queue immediately
    Yield,

    /// Run the prepared nested coroutine; resume this one when it is done
    Call(CoroutineId),

    /// Completed
    Done,
}
