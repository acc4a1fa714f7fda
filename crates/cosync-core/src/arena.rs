//! Fixed-capacity storage for coroutine records
//!
//! Records are allocated once, up front, and recycled through a LIFO free
//! stack so recently used (cache-warm) slots are handed out first. Every
//! cross-record reference is a [`CoroutineId`] into this arena.

use core::sync::atomic::{AtomicU32, Ordering};
use crate::id::CoroutineId;
use crate::record::Coroutine;
use crate::soft_mutex::SoftMutex;
use crate::error::{CoError, CoResult};

/// Arena of coroutine records
pub struct RecordArena {
    records: Box<[Coroutine]>,

    /// LIFO stack of released ids
    free_stack: SoftMutex<Vec<u32>>,

    /// Next never-used id
    next_fresh: AtomicU32,

    allocated_count: AtomicU32,
}

impl RecordArena {
    /// Create an arena holding `capacity` records
    pub fn new(capacity: usize) -> Self {
        assert!(capacity < u32::MAX as usize, "arena capacity collides with CoroutineId::NONE");
        let records = (0..capacity as u32)
            .map(|i| Coroutine::new(CoroutineId::new(i)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            records,
            // Pre-allocated so release() never reallocates
            free_stack: SoftMutex::new(Vec::with_capacity(capacity)),
            next_fresh: AtomicU32::new(0),
            allocated_count: AtomicU32::new(0),
        }
    }

    /// Reserve a record slot
    ///
    /// The record still has to be prepared with `prepare_root` or
    /// `prepare_child` before it is used.
    pub fn allocate(&self) -> CoResult<CoroutineId> {
        {
            let mut free = self.free_stack.lock();
            if let Some(id) = free.pop() {
                self.allocated_count.fetch_add(1, Ordering::Relaxed);
                return Ok(CoroutineId::new(id));
            }
        }

        let max = self.records.len() as u32;
        loop {
            let current = self.next_fresh.load(Ordering::Acquire);
            if current >= max {
                return Err(CoError::NoSlotsAvailable);
            }

            match self.next_fresh.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.allocated_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(CoroutineId::new(current));
                }
                Err(_) => continue,
            }
        }
    }

    /// Return a record slot for reuse
    pub fn release(&self, id: CoroutineId) {
        if id.is_none() {
            return;
        }
        let record = self.get(id);
        debug_assert!(!record.is_linked(), "{} released while enqueued on a wait list", id);
        #[cfg(debug_assertions)]
        record.invalidate();

        self.free_stack.lock().push(id.as_u32());
        self.allocated_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Borrow a record by id
    ///
    /// # Panics
    ///
    /// Panics if `id` is `NONE` or outside the arena.
    #[inline]
    pub fn get(&self, id: CoroutineId) -> &Coroutine {
        &self.records[id.as_usize()]
    }

    #[inline]
    pub fn try_get(&self, id: CoroutineId) -> Option<&Coroutine> {
        self.records.get(id.as_usize())
    }

    /// Follow `stack_parent` links up to the root of `id`'s call chain
    pub fn root_of(&self, id: CoroutineId) -> CoroutineId {
        let mut last = id;
        for node in self.ancestors(id) {
            last = node;
        }
        last
    }

    /// Iterate `id`, its caller, the caller's caller, ..., up to the root
    pub fn ancestors(&self, id: CoroutineId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: id,
            remaining: self.records.len(),
        }
    }

    #[inline]
    pub fn allocated_count(&self) -> u32 {
        self.allocated_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_valid(&self, id: CoroutineId) -> bool {
        id.is_some() && id.as_usize() < self.records.len()
    }
}

/// Iterator over a coroutine's call chain, innermost first
pub struct Ancestors<'a> {
    arena: &'a RecordArena,
    next: CoroutineId,
    /// Chain length can never exceed the arena size; guards against a cycle
    /// built from stale records
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = CoroutineId;

    fn next(&mut self) -> Option<CoroutineId> {
        if self.next.is_none() {
            return None;
        }
        assert!(self.remaining > 0, "stack_parent chain does not reach a root");
        self.remaining -= 1;

        let current = self.next;
        let record = self.arena.get(current);
        record.validate();
        let parent = record.stack_parent();
        self.next = if parent == current { CoroutineId::NONE } else { parent };
        Some(current)
    }
}
