//! Scheduler stub shared by the unit tests

use std::sync::Mutex;
use crate::arena::RecordArena;
use crate::id::CoroutineId;
use crate::record::Coroutine;
use crate::state::Step;
use crate::traits::Scheduler;

/// Records every wake in order; never runs anything
pub(crate) struct RecordingScheduler {
    arena: RecordArena,
    woken: Mutex<Vec<CoroutineId>>,
}

impl RecordingScheduler {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            arena: RecordArena::new(capacity),
            woken: Mutex::new(Vec::new()),
        }
    }

    /// Allocate and prepare a root record
    pub(crate) fn spawn(&self) -> &Coroutine {
        let id = self.arena.allocate().unwrap();
        let co = self.arena.get(id);
        co.prepare_root(idle_body);
        co
    }

    pub(crate) fn woken(&self) -> Vec<CoroutineId> {
        self.woken.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn records(&self) -> &RecordArena {
        &self.arena
    }

    fn wake(&self, id: CoroutineId) {
        self.woken.lock().unwrap().push(id);
    }
}

fn idle_body(_co: &Coroutine, _sched: &dyn Scheduler) -> Step {
    Step::Done
}
