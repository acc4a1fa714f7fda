//! Single-thread synchronization primitives
//!
//! Same shapes as the cross-thread family in [`condvar`](crate::condvar)
//! and [`semaphore`](crate::semaphore), for coroutines that all run on one
//! thread. No atomics, no soft mutex: state lives in `Cell`s, which also
//! makes every type here `!Sync`.
//!
//! Because nothing can run between a check and an enqueue, the semaphore
//! needs no registration counter, and `notify` hands its permit straight to
//! a queued waiter instead of going through the counter.

use core::cell::Cell;
use core::fmt;
use crate::arena::RecordArena;
use crate::id::CoroutineId;
use crate::mayblock::MayBlock;
use crate::record::Coroutine;
use crate::traits::Scheduler;

/// Wait-list ordering policy for the single-thread family
pub trait LocalWaitList {
    const EMPTY: Self;

    fn reset(&self);

    fn enqueue(&self, records: &RecordArena, id: CoroutineId);

    fn dequeue_one(&self, records: &RecordArena) -> Option<CoroutineId>;

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;
}

/// Unordered single-thread wait list
pub struct LocalConditionVariable {
    head: Cell<u32>,
    len: Cell<usize>,
}

/// FIFO single-thread wait list
pub struct LocalFifoConditionVariable {
    head: Cell<u32>,
    tail: Cell<u32>,
    len: Cell<usize>,
}

impl LocalWaitList for LocalConditionVariable {
    const EMPTY: Self = Self {
        head: Cell::new(u32::MAX),
        len: Cell::new(0),
    };

    fn reset(&self) {
        self.head.set(u32::MAX);
        self.len.set(0);
    }

    fn enqueue(&self, records: &RecordArena, id: CoroutineId) {
        let record = records.get(id);
        record.validate();
        record.link();
        record.set_next_waiter(CoroutineId::new(self.head.get()));
        self.head.set(id.as_u32());
        self.len.set(self.len.get() + 1);
    }

    fn dequeue_one(&self, records: &RecordArena) -> Option<CoroutineId> {
        let id = CoroutineId::new(self.head.get()).to_option()?;
        let record = records.get(id);
        self.head.set(record.next_waiter().as_u32());
        record.unlink();
        self.len.set(self.len.get() - 1);
        Some(id)
    }

    fn is_empty(&self) -> bool {
        self.head.get() == u32::MAX
    }

    fn len(&self) -> usize {
        self.len.get()
    }
}

impl LocalWaitList for LocalFifoConditionVariable {
    const EMPTY: Self = Self {
        head: Cell::new(u32::MAX),
        tail: Cell::new(u32::MAX),
        len: Cell::new(0),
    };

    fn reset(&self) {
        self.head.set(u32::MAX);
        self.tail.set(u32::MAX);
        self.len.set(0);
    }

    fn enqueue(&self, records: &RecordArena, id: CoroutineId) {
        let record = records.get(id);
        record.validate();
        record.link();
        record.set_next_waiter(CoroutineId::NONE);

        let tail = CoroutineId::new(self.tail.get());
        if tail.is_none() {
            self.head.set(id.as_u32());
        } else {
            records.get(tail).set_next_waiter(id);
        }
        self.tail.set(id.as_u32());
        self.len.set(self.len.get() + 1);
    }

    fn dequeue_one(&self, records: &RecordArena) -> Option<CoroutineId> {
        let id = CoroutineId::new(self.head.get()).to_option()?;
        let record = records.get(id);
        let next = record.next_waiter();
        self.head.set(next.as_u32());
        if next.is_none() {
            self.tail.set(u32::MAX);
        }
        record.unlink();
        self.len.set(self.len.get() - 1);
        Some(id)
    }

    fn is_empty(&self) -> bool {
        self.head.get() == u32::MAX
    }

    fn len(&self) -> usize {
        self.len.get()
    }
}

/// Condition variable operations shared by both local wait lists
pub trait LocalNotify: LocalWaitList + Sized {
    /// Describe a wait; evaluating it always suspends the caller
    fn wait(&self) -> CondWaitCall<'_, Self> {
        CondWaitCall { cv: self }
    }

    /// Wake one waiter; returns false if there was none
    fn notify_one<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        match self.dequeue_one(sched.records()) {
            Some(id) => {
                sched.wake(id);
                true
            }
            None => false,
        }
    }

    /// Wake every waiter; returns how many were woken
    fn notify_all<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        let mut woken = 0;
        while self.notify_one(sched) {
            woken += 1;
        }
        woken
    }
}

impl<L: LocalWaitList> LocalNotify for L {}

/// Pending wait on a local condition variable
#[must_use = "a CondWaitCall does nothing until evaluated"]
pub struct CondWaitCall<'a, L: LocalWaitList> {
    cv: &'a L,
}

impl<'a, L: LocalWaitList> CondWaitCall<'a, L> {
    pub fn evaluate<S: Scheduler + ?Sized>(self, sched: &S, co: &Coroutine) -> MayBlock {
        self.cv.enqueue(sched.records(), co.id());
        MayBlock::WouldBlock
    }
}

/// Plain single-thread semaphore (explicit `initialise`)
pub struct RawLocalSemaphoreBase<C: LocalWaitList> {
    waiters: C,
    counter: Cell<usize>,
    #[cfg(debug_assertions)]
    initialised: Cell<bool>,
}

impl<C: LocalWaitList> RawLocalSemaphoreBase<C> {
    pub const fn uninit() -> Self {
        Self {
            waiters: C::EMPTY,
            counter: Cell::new(0),
            #[cfg(debug_assertions)]
            initialised: Cell::new(false),
        }
    }

    const fn with_count(count: usize) -> Self {
        Self {
            waiters: C::EMPTY,
            counter: Cell::new(count),
            #[cfg(debug_assertions)]
            initialised: Cell::new(true),
        }
    }

    pub fn initialise(&self, count: usize) {
        #[cfg(debug_assertions)]
        {
            assert!(!self.initialised.get(), "local semaphore initialised twice");
            self.initialised.set(true);
        }
        self.waiters.reset();
        self.counter.set(count);
    }

    #[inline]
    pub const fn wait(&self) -> LocalWaitCall<'_, C> {
        LocalWaitCall { semaphore: self }
    }

    /// Hand a permit to a queued waiter, or bank it
    pub fn notify<S: Scheduler + ?Sized>(&self, sched: &S) {
        self.check_initialised();
        match self.waiters.dequeue_one(sched.records()) {
            Some(id) => sched.wake(id),
            None => self.counter.set(self.counter.get() + 1),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.counter.get()
    }

    #[inline]
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    #[inline]
    fn check_initialised(&self) {
        #[cfg(debug_assertions)]
        assert!(self.initialised.get(), "local semaphore used before initialise()");
    }
}

impl<C: LocalWaitList> fmt::Debug for RawLocalSemaphoreBase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSemaphore")
            .field("count", &self.count())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Pending wait on a local semaphore
#[must_use = "a LocalWaitCall does nothing until evaluated"]
pub struct LocalWaitCall<'a, C: LocalWaitList> {
    semaphore: &'a RawLocalSemaphoreBase<C>,
}

impl<'a, C: LocalWaitList> LocalWaitCall<'a, C> {
    pub fn evaluate<S: Scheduler + ?Sized>(self, sched: &S, co: &Coroutine) -> MayBlock {
        let sem = self.semaphore;
        sem.check_initialised();
        co.validate();

        let available = sem.counter.get();
        if available > 0 {
            sem.counter.set(available - 1);
            MayBlock::NoBlock
        } else {
            sem.waiters.enqueue(sched.records(), co.id());
            MayBlock::WouldBlock
        }
    }
}

/// Single-thread semaphore with a constructor
pub struct LocalSemaphoreBase<C: LocalWaitList> {
    raw: RawLocalSemaphoreBase<C>,
}

impl<C: LocalWaitList> LocalSemaphoreBase<C> {
    pub const fn new(count: usize) -> Self {
        Self {
            raw: RawLocalSemaphoreBase::with_count(count),
        }
    }

    #[inline]
    pub const fn wait(&self) -> LocalWaitCall<'_, C> {
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
}

impl<C: LocalWaitList> Default for LocalSemaphoreBase<C> {
    fn default() -> Self {
        Self::new(0)
    }
}

pub type RawLocalSemaphore = RawLocalSemaphoreBase<LocalConditionVariable>;
pub type RawLocalFifoSemaphore = RawLocalSemaphoreBase<LocalFifoConditionVariable>;
pub type LocalSemaphore = LocalSemaphoreBase<LocalConditionVariable>;
pub type LocalFifoSemaphore = LocalSemaphoreBase<LocalFifoConditionVariable>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingScheduler;

    #[test]
    fn test_local_semaphore_counts_down() {
        let sched = RecordingScheduler::new(2);
        let sem = LocalSemaphore::new(1);
        let co = sched.spawn();

        assert_eq!(sem.wait().evaluate(&sched, co), MayBlock::NoBlock);
        assert_eq!(sem.wait().evaluate(&sched, co), MayBlock::WouldBlock);
        assert_eq!(sem.waiting(), 1);
    }

    #[test]
    fn test_local_notify_hands_permit_to_waiter() {
        let sched = RecordingScheduler::new(2);
        let sem = LocalFifoSemaphore::default();
        let co = sched.spawn();

        assert!(sem.wait().evaluate(&sched, co).would_block());
        sem.notify(&sched);
        assert_eq!(sched.woken(), vec![co.id()]);
        // Permit went to the waiter, not the counter
        assert_eq!(sem.count(), 0);

        sem.notify(&sched);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_local_fifo_order() {
        let sched = RecordingScheduler::new(4);
        let sem = RawLocalFifoSemaphore::uninit();
        sem.initialise(0);
        let cos: Vec<_> = (0..3).map(|_| sched.spawn()).collect();
        for co in &cos {
            assert!(sem.wait().evaluate(&sched, co).would_block());
        }
        for _ in 0..3 {
            sem.notify(&sched);
        }
        let expected: Vec<_> = cos.iter().map(|c| c.id()).collect();
        assert_eq!(sched.woken(), expected);
    }

    #[test]
    fn test_local_condition_variable_notify_all() {
        let sched = RecordingScheduler::new(4);
        let cv = LocalConditionVariable::EMPTY;
        for _ in 0..3 {
            let co = sched.spawn();
            assert!(cv.wait().evaluate(&sched, co).would_block());
        }
        assert_eq!(cv.len(), 3);
        assert!(cv.notify_one(&sched));
        assert_eq!(cv.notify_all(&sched), 2);
        assert!(!cv.notify_one(&sched));
        assert_eq!(sched.woken().len(), 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "before initialise")]
    fn test_local_notify_before_initialise_panics() {
        let sched = RecordingScheduler::new(1);
        let sem = RawLocalSemaphore::uninit();
        sem.notify(&sched);
    }
}
