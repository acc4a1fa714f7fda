//! Interface between the synchronization layer and whatever runs coroutines
//!
//! Semaphores and condition variables never execute coroutine code. When
//! they release a waiter they hand its id to a [`Scheduler`], which owns the
//! record storage and decides when and where the coroutine's next step runs.

use crate::arena::RecordArena;
use crate::error::CoResult;
use crate::id::CoroutineId;
use crate::record::{Coroutine, EntryFn};

/// Owner of the record arena and sink for wake-ups
pub trait Scheduler: Send + Sync {
    /// The arena every `CoroutineId` passed to primitives refers to
    fn records(&self) -> &RecordArena;

    /// Make a waiting coroutine runnable again
    ///
    /// Called from any thread, possibly while the woken coroutine's own step
    /// is still returning from the suspension point that enqueued it.
    /// Implementations must not run the coroutine inline.
    fn wake(&self, id: CoroutineId);

    /// Allocate and prepare a coroutine nested inside `parent`
    ///
    /// The child is not queued. `parent` ends its step with
    /// `Step::Call(child)` and is woken when the child completes.
    fn prepare_child(&self, parent: &Coroutine, entry: EntryFn) -> CoResult<CoroutineId> {
        let id = self.records().allocate()?;
        self.records().get(id).prepare_child(entry, parent);
        Ok(id)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    #[inline]
    fn records(&self) -> &RecordArena {
        (**self).records()
    }

    #[inline]
    fn wake(&self, id: CoroutineId) {
        (**self).wake(id)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for std::sync::Arc<S> {
    #[inline]
    fn records(&self) -> &RecordArena {
        (**self).records()
    }

    #[inline]
    fn wake(&self, id: CoroutineId) {
        (**self).wake(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Step;
    use crate::testing::RecordingScheduler;

    fn body(_co: &Coroutine, _sched: &dyn Scheduler) -> Step {
        Step::Done
    }

    #[test]
    fn test_prepare_child_links_to_parent() {
        let sched = RecordingScheduler::new(4);
        let parent = sched.spawn();
        let child = sched.prepare_child(parent, body).unwrap();
        let grandchild = (&sched as &dyn Scheduler)
            .prepare_child(sched.records().get(child), body)
            .unwrap();

        let rec = sched.records().get(grandchild);
        assert_eq!(rec.stack_parent(), child);
        assert_eq!(rec.root(), parent.id());
        assert!(sched.woken().is_empty());
    }

    #[test]
    fn test_prepare_child_reports_full_arena() {
        let sched = RecordingScheduler::new(1);
        let parent = sched.spawn();
        assert_eq!(
            sched.prepare_child(parent, body),
            Err(crate::error::CoError::NoSlotsAvailable)
        );
    }
}
