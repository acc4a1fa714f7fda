//! Counting semaphore for coroutines running on many threads
//!
//! `wait` blocks a *coroutine*, never the OS thread: when no permit is
//! available the caller's record is linked into the semaphore's wait list
//! and its suspension step reports [`MayBlock::WouldBlock`]. A later
//! `notify`, from any thread, hands the permit to exactly one queued
//! coroutine through [`Scheduler::wake`].
//!
//! # Protocol
//!
//! ```text
//! wait (suspension step)                 notify
//! ----------------------                 ------
//! CAS count-1 if > 0 ── ok ──> NoBlock   count += 1
//! registering += 1                       if registering == 0 && list empty:
//! CAS count-1 if > 0 ── ok ──> NoBlock       return
//! lock                                   lock
//!   CAS count-1 if > 0 ── ok ─┐            if list non-empty && CAS count-1:
//!   else enqueue self         │              dequeue one
//!   registering -= 1  <───────┘          unlock
//! unlock                                 wake the dequeued coroutine
//! -> WouldBlock / NoBlock
//! ```
//!
//! `count`, `registering` and the list head are all accessed `SeqCst`. A
//! notifier that skips the lock has observed `registering == 0` after its
//! increment, so any waiter that has not yet registered will see the permit
//! in one of its re-checks. A waiter enqueues only while holding the lock
//! with `registering > 0`, so a notifier that increments after that
//! waiter's last re-check always takes the lock and finds it.
//!
//! The soft mutex is held only around the final re-check plus link/unlink;
//! the woken coroutine is handed to the scheduler after it is released.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(debug_assertions)]
use core::sync::atomic::AtomicBool;
use crate::condvar::{ConditionVariable, FifoConditionVariable, WaitList};
use crate::mayblock::MayBlock;
use crate::record::Coroutine;
use crate::soft_mutex::SoftMutex;
use crate::traits::Scheduler;
use crate::ktrace;

/// Plain semaphore: no constructor, explicit [`initialise`](Self::initialise)
///
/// Suitable for `static` items and storage whose contents are not
/// constructed by Rust. Using it before `initialise` is a programming error
/// (caught in debug builds).
pub struct RawSemaphoreBase<C: WaitList> {
    lock: SoftMutex<()>,
    waiters: C,
    count: AtomicUsize,
    registering: AtomicUsize,
    #[cfg(debug_assertions)]
    initialised: AtomicBool,
}

impl<C: WaitList> RawSemaphoreBase<C> {
    /// Storage for a semaphore that still needs `initialise`
    pub const fn uninit() -> Self {
        Self {
            lock: SoftMutex::new(()),
            waiters: C::EMPTY,
            count: AtomicUsize::new(0),
            registering: AtomicUsize::new(0),
            #[cfg(debug_assertions)]
            initialised: AtomicBool::new(false),
        }
    }

    const fn with_count(count: usize) -> Self {
        Self {
            lock: SoftMutex::new(()),
            waiters: C::EMPTY,
            count: AtomicUsize::new(count),
            registering: AtomicUsize::new(0),
            #[cfg(debug_assertions)]
            initialised: AtomicBool::new(true),
        }
    }

    /// Set the initial permit count and empty the wait list
    ///
    /// Must be called exactly once, before any `wait` or `notify`, with no
    /// other thread touching the semaphore.
    pub fn initialise(&self, count: usize) {
        #[cfg(debug_assertions)]
        if self.initialised.swap(true, Ordering::Relaxed) {
            crate::kerror!("semaphore initialised twice");
            panic!("semaphore initialised twice");
        }

        self.lock.reset();
        {
            let held = self.lock.lock();
            self.waiters.reset(&held);
        }
        self.registering.store(0, Ordering::Relaxed);
        self.count.store(count, Ordering::SeqCst);
    }

    /// Describe a wait on this semaphore
    ///
    /// Nothing happens until the returned call's [`WaitCall::evaluate`] is
    /// run from inside the waiting coroutine's step.
    #[inline]
    pub const fn wait(&self) -> WaitCall<'_, C> {
        WaitCall { semaphore: self }
    }

    /// Release one permit, resuming a queued coroutine if there is one
    pub fn notify<S: Scheduler + ?Sized>(&self, sched: &S) {
        self.check_initialised();
        self.count.fetch_add(1, Ordering::SeqCst);

        if self.registering.load(Ordering::SeqCst) == 0 && self.waiters.is_empty() {
            return;
        }

        let woken = {
            let held = self.lock.lock();
            // A fast-path waiter may already have taken the permit; then the
            // queued waiter stays queued for the next notify.
            if !self.waiters.is_empty() && self.try_take() {
                self.waiters.dequeue_one(&held, sched.records())
            } else {
                None
            }
        };

        if let Some(id) = woken {
            ktrace!("semaphore: handing permit to {}", id);
            sched.wake(id);
        }
    }

    /// Available permits (racy snapshot)
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Coroutines between a failed fast path and their enqueue (racy snapshot)
    #[inline]
    pub fn registering(&self) -> usize {
        self.registering.load(Ordering::Relaxed)
    }

    /// Queued coroutines (racy snapshot)
    #[inline]
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    /// Take one permit if any is available
    fn try_take(&self) -> bool {
        let mut current = self.count.load(Ordering::SeqCst);
        while current > 0 {
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn begin_registration(&self) {
        self.registering.fetch_add(1, Ordering::SeqCst);
    }

    fn abort_registration(&self) {
        self.registering.fetch_sub(1, Ordering::SeqCst);
    }

    /// Final re-check and enqueue, under the soft mutex
    fn complete_registration<S: Scheduler + ?Sized>(&self, sched: &S, co: &Coroutine) -> MayBlock {
        let blocked = {
            let held = self.lock.lock();
            // A notify that ran after the lock-free re-check found nothing
            // queued and left its permit in `count`.
            let blocked = if self.try_take() {
                false
            } else {
                self.waiters.enqueue(&held, sched.records(), co.id());
                true
            };
            self.registering.fetch_sub(1, Ordering::SeqCst);
            blocked
        };

        if blocked {
            ktrace!("semaphore: {} suspended", co.id());
        }
        MayBlock::from_blocked(blocked)
    }

    #[inline]
    fn check_initialised(&self) {
        #[cfg(debug_assertions)]
        if !self.initialised.load(Ordering::Relaxed) {
            crate::kerror!("semaphore used before initialise()");
            panic!("semaphore used before initialise()");
        }
    }
}

impl<C: WaitList> fmt::Debug for RawSemaphoreBase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &self.count())
            .field("registering", &self.registering())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// A pending wait on a semaphore
///
/// Built by [`RawSemaphoreBase::wait`]; consumed by [`evaluate`](Self::evaluate).
#[must_use = "a WaitCall does nothing until evaluated"]
pub struct WaitCall<'a, C: WaitList> {
    semaphore: &'a RawSemaphoreBase<C>,
}

impl<'a, C: WaitList> WaitCall<'a, C> {
    /// Run the wait protocol for `co`
    ///
    /// On `WouldBlock` the record is queued on the semaphore and the
    /// coroutine must end its step with `Step::Suspend`; it owns one permit
    /// once it is woken. On `NoBlock` it owns one permit right away and no
    /// lock was taken.
    pub fn evaluate<S: Scheduler + ?Sized>(self, sched: &S, co: &Coroutine) -> MayBlock {
        let sem = self.semaphore;
        sem.check_initialised();
        co.validate();
        debug_assert!(
            core::ptr::eq(sched.records().get(co.id()), co),
            "{} does not belong to the scheduler's arena",
            co.id()
        );

        if sem.try_take() {
            return MayBlock::NoBlock;
        }

        sem.begin_registration();
        if sem.try_take() {
            sem.abort_registration();
            return MayBlock::NoBlock;
        }

        sem.complete_registration(sched, co)
    }
}

/// Semaphore with a constructor
pub struct SemaphoreBase<C: WaitList> {
    raw: RawSemaphoreBase<C>,
}

impl<C: WaitList> SemaphoreBase<C> {
    /// Create a semaphore holding `count` permits
    pub const fn new(count: usize) -> Self {
        Self {
            raw: RawSemaphoreBase::with_count(count),
        }
    }

    #[inline]
    pub const fn wait(&self) -> WaitCall<'_, C> {
        self.raw.wait()
    }

    #[inline]
    pub fn notify<S: Scheduler + ?Sized>(&self, sched: &S) {
        self.raw.notify(sched)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.raw.count()
    }

    #[inline]
    pub fn waiting(&self) -> usize {
        self.raw.waiting()
    }

    #[inline]
    pub fn as_raw(&self) -> &RawSemaphoreBase<C> {
        &self.raw
    }
}

impl<C: WaitList> Default for SemaphoreBase<C> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<C: WaitList> fmt::Debug for SemaphoreBase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

pub type RawSemaphore = RawSemaphoreBase<ConditionVariable>;
pub type RawFifoSemaphore = RawSemaphoreBase<FifoConditionVariable>;
pub type Semaphore = SemaphoreBase<ConditionVariable>;
pub type FifoSemaphore = SemaphoreBase<FifoConditionVariable>;
