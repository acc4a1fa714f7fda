//! Thread-safe condition variables (wait lists of suspended coroutines)
//!
//! The wait list is intrusive: each queued record's `next_waiter` slot holds
//! the id of the record behind it, so enqueue and dequeue never allocate and
//! cannot fail. Mutation is only allowed under external mutual exclusion,
//! which callers prove by passing the guard of the soft mutex that protects
//! the list. The head is stored atomically so `is_empty` can be read as a
//! lock-free hint.
//!
//! Two orderings are provided:
//!
//! - [`ConditionVariable`]: unordered. Insertion and removal both work on the
//!   head; which waiter is picked is unspecified.
//! - [`FifoConditionVariable`]: waiters are released in arrival order.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use crate::arena::RecordArena;
use crate::id::CoroutineId;
use crate::soft_mutex::SoftMutexGuard;

/// Proof that the caller holds the list's soft mutex
pub type Held<'a, 'g> = &'a SoftMutexGuard<'g, ()>;

/// Wait-list ordering policy
pub trait WaitList: Send + Sync {
    /// An empty list, for `const` construction of the primitives using it
    const EMPTY: Self;

    /// Drop all entries without waking them (initialisation only)
    fn reset(&self, held: Held<'_, '_>);

    /// Append `id` to the list
    fn enqueue(&self, held: Held<'_, '_>, records: &RecordArena, id: CoroutineId);

    /// Remove one waiter, if any
    fn dequeue_one(&self, held: Held<'_, '_>, records: &RecordArena) -> Option<CoroutineId>;

    /// Lock-free emptiness hint
    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;
}

/// Unordered wait list
pub struct ConditionVariable {
    head: AtomicU32,
    len: AtomicUsize,
}

impl ConditionVariable {
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(u32::MAX),
            len: AtomicUsize::new(0),
        }
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitList for ConditionVariable {
    const EMPTY: Self = ConditionVariable::new();

    fn reset(&self, _held: Held<'_, '_>) {
        self.head.store(u32::MAX, Ordering::SeqCst);
        self.len.store(0, Ordering::Relaxed);
    }

    fn enqueue(&self, _held: Held<'_, '_>, records: &RecordArena, id: CoroutineId) {
        let record = records.get(id);
        record.validate();
        record.link();
        record.set_next_waiter(CoroutineId::new(self.head.load(Ordering::Relaxed)));
        self.head.store(id.as_u32(), Ordering::SeqCst);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn dequeue_one(&self, _held: Held<'_, '_>, records: &RecordArena) -> Option<CoroutineId> {
        let id = CoroutineId::new(self.head.load(Ordering::Relaxed)).to_option()?;
        let record = records.get(id);
        self.head.store(record.next_waiter().as_u32(), Ordering::SeqCst);
        record.unlink();
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(id)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst) == u32::MAX
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

/// First-in first-out wait list
pub struct FifoConditionVariable {
    head: AtomicU32,
    tail: AtomicU32,
    len: AtomicUsize,
}

impl FifoConditionVariable {
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(u32::MAX),
            tail: AtomicU32::new(u32::MAX),
            len: AtomicUsize::new(0),
        }
    }
}

impl Default for FifoConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitList for FifoConditionVariable {
    const EMPTY: Self = FifoConditionVariable::new();

    fn reset(&self, _held: Held<'_, '_>) {
        self.head.store(u32::MAX, Ordering::SeqCst);
        self.tail.store(u32::MAX, Ordering::Relaxed);
        self.len.store(0, Ordering::Relaxed);
    }

    fn enqueue(&self, _held: Held<'_, '_>, records: &RecordArena, id: CoroutineId) {
        let record = records.get(id);
        record.validate();
        record.link();
        record.set_next_waiter(CoroutineId::NONE);

        let tail = CoroutineId::new(self.tail.load(Ordering::Relaxed));
        if tail.is_none() {
            self.head.store(id.as_u32(), Ordering::SeqCst);
        } else {
            records.get(tail).set_next_waiter(id);
        }
        self.tail.store(id.as_u32(), Ordering::Relaxed);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn dequeue_one(&self, _held: Held<'_, '_>, records: &RecordArena) -> Option<CoroutineId> {
        let id = CoroutineId::new(self.head.load(Ordering::Relaxed)).to_option()?;
        let record = records.get(id);
        let next = record.next_waiter();
        self.head.store(next.as_u32(), Ordering::SeqCst);
        if next.is_none() {
            self.tail.store(u32::MAX, Ordering::Relaxed);
        }
        record.unlink();
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(id)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst) == u32::MAX
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Coroutine;
    use crate::soft_mutex::SoftMutex;
    use crate::state::Step;
    use crate::traits::Scheduler;

    fn body(_co: &Coroutine, _sched: &dyn Scheduler) -> Step {
        Step::Done
    }

    fn prepared(arena: &RecordArena, n: usize) -> Vec<CoroutineId> {
        (0..n)
            .map(|_| {
                let id = arena.allocate().unwrap();
                arena.get(id).prepare_root(body);
                id
            })
            .collect()
    }

    fn drain<L: WaitList>(list: &L, lock: &SoftMutex<()>, arena: &RecordArena) -> Vec<CoroutineId> {
        let held = lock.lock();
        std::iter::from_fn(|| list.dequeue_one(&held, arena)).collect()
    }

    #[test]
    fn test_fifo_order() {
        let arena = RecordArena::new(8);
        let ids = prepared(&arena, 4);
        let lock = SoftMutex::new(());
        let list = FifoConditionVariable::new();

        {
            let held = lock.lock();
            for id in &ids {
                list.enqueue(&held, &arena, *id);
            }
        }
        assert_eq!(list.len(), 4);
        assert!(ids.iter().all(|id| arena.get(*id).is_linked()));

        assert_eq!(drain(&list, &lock, &arena), ids);
        assert!(list.is_empty());
        assert!(ids.iter().all(|id| !arena.get(*id).is_linked()));
    }

    #[test]
    fn test_fifo_interleaved() {
        let arena = RecordArena::new(8);
        let ids = prepared(&arena, 3);
        let lock = SoftMutex::new(());
        let list = FifoConditionVariable::new();

        let held = lock.lock();
        list.enqueue(&held, &arena, ids[0]);
        assert_eq!(list.dequeue_one(&held, &arena), Some(ids[0]));
        // tail must have been cleared when the list emptied
        list.enqueue(&held, &arena, ids[1]);
        list.enqueue(&held, &arena, ids[2]);
        assert_eq!(list.dequeue_one(&held, &arena), Some(ids[1]));
        assert_eq!(list.dequeue_one(&held, &arena), Some(ids[2]));
        assert_eq!(list.dequeue_one(&held, &arena), None);
    }

    #[test]
    fn test_unordered_returns_every_waiter_once() {
        let arena = RecordArena::new(8);
        let ids = prepared(&arena, 5);
        let lock = SoftMutex::new(());
        let list = ConditionVariable::new();

        {
            let held = lock.lock();
            for id in &ids {
                list.enqueue(&held, &arena, *id);
            }
        }
        let mut out = drain(&list, &lock, &arena);
        out.sort();
        assert_eq!(out, ids);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_reset_empties() {
        let arena = RecordArena::new(2);
        let ids = prepared(&arena, 1);
        let lock = SoftMutex::new(());
        let list = ConditionVariable::new();
        let held = lock.lock();
        list.enqueue(&held, &arena, ids[0]);
        assert!(!list.is_empty());
        list.reset(&held);
        assert!(list.is_empty());
        assert_eq!(list.dequeue_one(&held, &arena), None);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "two wait lists")]
    fn test_double_enqueue_is_rejected() {
        let arena = RecordArena::new(2);
        let ids = prepared(&arena, 1);
        let lock = SoftMutex::new(());
        let a = ConditionVariable::new();
        let b = FifoConditionVariable::new();
        let held = lock.lock();
        a.enqueue(&held, &arena, ids[0]);
        b.enqueue(&held, &arena, ids[0]);
    }
}
