//! Coroutine executor
//!
//! Owns the record arena and the ready queue, implements [`Scheduler`], and
//! steps coroutine bodies either on the calling thread
//! ([`run_until_idle`](Executor::run_until_idle)) or on a worker pool
//! ([`start`](Executor::start)).
//!
//! # State machine
//!
//! ```text
//!            wake/spawn            pop
//!   Idle ──────────────> Ready ──────────> Running
//!                          ^                │ │ │
//!          wake            │   Yield        │ │ │ Done
//!   Suspended ─────────────┼────────────────┘ │ └──────> Finished (released)
//!       ^                  │                  │
//!       │  Suspend / Call  │ Notified         │ wake while running
//!       └──────────────────┴──────────────────┘
//! ```
//!
//! A wake that lands while the step is still running moves the record to
//! `Notified`; the worker finishing the step then requeues it instead of
//! parking it. Every transition out of `Running` is a CAS so the wake and
//! the step's return agree on exactly one outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cosync_core::kprint::{log_level, set_log_level, LogLevel};
use cosync_core::{
    kdebug, kerror, kinfo, ktrace, kwarn, CoResult, Coroutine, CoroutineId, CoroutineState,
    EntryFn, RecordArena, Scheduler, Step,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::ready_queue::ReadyQueue;
use crate::worker::{current_worker_id, WorkerPool};

pub struct Executor {
    arena: RecordArena,
    ready: ReadyQueue,
    config: RuntimeConfig,
    shutdown: AtomicBool,
    steps: AtomicU64,
    drained_lock: Mutex<()>,
    drained: Condvar,
}

impl Executor {
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.debug_logging && log_level() < LogLevel::Debug {
            set_log_level(LogLevel::Debug);
        }
        kinfo!(
            "executor: {} workers, {} record slots",
            config.num_workers,
            config.max_coroutines
        );

        Ok(Self {
            arena: RecordArena::new(config.max_coroutines),
            ready: ReadyQueue::new(),
            config,
            shutdown: AtomicBool::new(false),
            steps: AtomicU64::new(0),
            drained_lock: Mutex::new(()),
            drained: Condvar::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start a new root coroutine
    pub fn spawn(&self, entry: EntryFn) -> CoResult<CoroutineId> {
        let id = self.arena.allocate()?;
        self.arena.get(id).prepare_root(entry);
        ktrace!("executor: spawned {}", id);
        self.wake(id);
        Ok(id)
    }

    /// Prepare a coroutine nested inside `parent` without queueing it
    ///
    /// `parent` runs it by returning `Step::Call(child)` from its step.
    pub fn spawn_child(&self, parent: CoroutineId, entry: EntryFn) -> CoResult<CoroutineId> {
        self.prepare_child(self.arena.get(parent), entry)
    }

    /// Run one step of `id`, which must be `Ready`
    pub fn run_step(&self, id: CoroutineId) {
        let co = self.arena.get(id);
        if let Err(actual) = co.transition(CoroutineState::Ready, CoroutineState::Running) {
            kwarn!("executor: {} dequeued while {}", id, actual);
            return;
        }

        let step = match co.entry() {
            Some(entry) => entry(co, self),
            None => {
                kerror!("executor: {} has no entry function", id);
                Step::Done
            }
        };
        self.steps.fetch_add(1, Ordering::Relaxed);

        match step {
            Step::Suspend => self.park_or_requeue(co),
            Step::Yield => {
                co.set_state(CoroutineState::Ready);
                self.ready.push(id);
            }
            Step::Call(child) => {
                debug_assert_eq!(
                    self.arena.get(child).stack_parent(),
                    id,
                    "{} called {} which is not its child",
                    id,
                    child
                );
                self.park_or_requeue(co);
                self.wake(child);
            }
            Step::Done => self.finish(co),
        }
    }

    /// Step queued coroutines on the calling thread until the queue is empty
    ///
    /// Returns the number of steps run. Coroutines still suspended on a
    /// primitive stay allocated.
    pub fn run_until_idle(&self) -> usize {
        let mut steps = 0;
        while let Some(id) = self.ready.pop() {
            self.run_step(id);
            steps += 1;
        }
        steps
    }

    /// Launch `num_workers` threads stepping this executor
    pub fn start(self: &Arc<Self>) -> CoResult<WorkerPool> {
        self.shutdown.store(false, Ordering::Release);
        let mut pool = WorkerPool::new(self.config.num_workers);
        let exec = Arc::clone(self);
        if let Err(e) = pool.start(move |index| exec.worker_loop(index)) {
            let _ = self.shutdown(pool);
            return Err(e);
        }
        Ok(pool)
    }

    /// Stop the workers after their current step and join them
    pub fn shutdown(&self, pool: WorkerPool) -> CoResult<()> {
        self.shutdown.store(true, Ordering::Release);
        self.ready.wake_all();
        pool.join()
    }

    /// Block until no coroutine is allocated, at most `timeout`
    pub fn wait_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.drained_lock.lock().unwrap_or_else(|e| e.into_inner());
        while self.arena.allocated_count() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .drained
                .wait_timeout(guard, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    /// Live (allocated, not finished) coroutines
    #[inline]
    pub fn live(&self) -> usize {
        self.arena.allocated_count() as usize
    }

    #[inline]
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    #[inline]
    pub fn steps_run(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    fn worker_loop(&self, index: usize) {
        kdebug!("worker {} started", index);
        let mut spins = 0u32;

        while !self.shutdown.load(Ordering::Acquire) {
            if let Some(id) = self.ready.pop() {
                self.run_step(id);
                spins = 0;
                continue;
            }
            if spins < self.config.idle_spins {
                spins += 1;
                std::hint::spin_loop();
                continue;
            }

            let seen = self.ready.epoch();
            if self.ready.is_empty() && !self.shutdown.load(Ordering::Acquire) {
                self.ready.park(seen, self.config.park_timeout);
            }
            spins = 0;
        }

        kdebug!("worker {} stopped after {} total steps", index, self.steps_run());
    }

    /// Leave `Running` after `Suspend`/`Call`
    fn park_or_requeue(&self, co: &Coroutine) {
        match co.transition(CoroutineState::Running, CoroutineState::Suspended) {
            Ok(()) => {}
            Err(CoroutineState::Notified) => {
                co.set_state(CoroutineState::Ready);
                self.ready.push(co.id());
            }
            Err(actual) => kerror!("executor: {} suspended while {}", co.id(), actual),
        }
    }

    fn finish(&self, co: &Coroutine) {
        let id = co.id();
        let parent = co.stack_parent();
        co.set_state(CoroutineState::Finished);
        self.arena.release(id);
        ktrace!("executor: {} finished", id);

        if parent != id {
            self.wake(parent);
        }
        if self.arena.allocated_count() == 0 {
            let _guard = self.drained_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.drained.notify_all();
        }
    }
}

impl Scheduler for Executor {
    #[inline]
    fn records(&self) -> &RecordArena {
        &self.arena
    }

    fn wake(&self, id: CoroutineId) {
        let co = self.arena.get(id);
        loop {
            let state = co.state();
            match state {
                CoroutineState::Idle | CoroutineState::Suspended => {
                    if co.transition(state, CoroutineState::Ready).is_ok() {
                        self.ready.push(id);
                        return;
                    }
                }
                CoroutineState::Running => {
                    if co.transition(state, CoroutineState::Notified).is_ok() {
                        ktrace!(
                            "executor: {} woken mid-step (worker {:?})",
                            id,
                            current_worker_id()
                        );
                        return;
                    }
                }
                CoroutineState::Ready | CoroutineState::Notified => return,
                CoroutineState::Finished => {
                    kwarn!("executor: wake for finished {}", id);
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("live", &self.live())
            .field("queued", &self.queued())
            .field("steps", &self.steps_run())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosync_core::{FifoSemaphore, MayBlock, Semaphore, RESUME_START};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn config() -> RuntimeConfig {
        RuntimeConfig::new()
            .num_workers(2)
            .max_coroutines(64)
            .park_timeout(Duration::from_millis(2))
    }

    fn counting(_co: &Coroutine, _sched: &dyn Scheduler) -> Step {
        RUNS.fetch_add(1, Ordering::SeqCst);
        Step::Done
    }
    static RUNS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn test_spawn_and_run_to_completion() {
        let exec = Executor::new(config()).unwrap();
        let before = RUNS.load(Ordering::SeqCst);
        for _ in 0..5 {
            exec.spawn(counting).unwrap();
        }
        assert_eq!(exec.live(), 5);
        assert_eq!(exec.run_until_idle(), 5);
        assert!(RUNS.load(Ordering::SeqCst) >= before + 5);
        assert_eq!(exec.live(), 0);
        assert!(exec.wait_all(Duration::ZERO));
    }

    fn yield_three_times(co: &Coroutine, _sched: &dyn Scheduler) -> Step {
        let point = co.resume_point();
        if point < 3 {
            co.set_resume_point(point + 1);
            Step::Yield
        } else {
            Step::Done
        }
    }

    #[test]
    fn test_yield_requeues() {
        let exec = Executor::new(config()).unwrap();
        exec.spawn(yield_three_times).unwrap();
        assert_eq!(exec.run_until_idle(), 4);
        assert_eq!(exec.live(), 0);
    }

    // Parent calls a child, which calls a grandchild; each records its depth.
    static CALL_LOG: StdMutex<Vec<&'static str>> = StdMutex::new(Vec::new());

    fn grandchild(co: &Coroutine, _sched: &dyn Scheduler) -> Step {
        assert!(!co.is_root());
        CALL_LOG.lock().unwrap().push("grandchild");
        Step::Done
    }

    fn child(co: &Coroutine, sched: &dyn Scheduler) -> Step {
        match co.resume_point() {
            RESUME_START => {
                CALL_LOG.lock().unwrap().push("child enter");
                co.set_resume_point(1);
                let gc = sched.prepare_child(co, grandchild).unwrap();
                assert_eq!(sched.records().root_of(gc), co.root());
                Step::Call(gc)
            }
            _ => {
                CALL_LOG.lock().unwrap().push("child exit");
                Step::Done
            }
        }
    }

    fn parent(co: &Coroutine, sched: &dyn Scheduler) -> Step {
        match co.resume_point() {
            RESUME_START => {
                CALL_LOG.lock().unwrap().push("parent enter");
                co.set_resume_point(1);
                Step::Call(sched.prepare_child(co, child).unwrap())
            }
            _ => {
                CALL_LOG.lock().unwrap().push("parent exit");
                Step::Done
            }
        }
    }

    #[test]
    fn test_nested_calls_resume_parents_in_order() {
        let exec = Executor::new(config()).unwrap();
        exec.spawn(parent).unwrap();
        exec.run_until_idle();
        assert_eq!(
            *CALL_LOG.lock().unwrap(),
            vec!["parent enter", "child enter", "grandchild", "child exit", "parent exit"]
        );
        assert_eq!(exec.live(), 0);
    }

    static GATE: Semaphore = Semaphore::new(0);
    static PASSED: AtomicUsize = AtomicUsize::new(0);

    fn gated(co: &Coroutine, sched: &dyn Scheduler) -> Step {
        match co.resume_point() {
            RESUME_START => {
                co.set_resume_point(1);
                match GATE.wait().evaluate(sched, co) {
                    MayBlock::WouldBlock => Step::Suspend,
                    MayBlock::NoBlock => gated(co, sched),
                }
            }
            _ => {
                PASSED.fetch_add(1, Ordering::SeqCst);
                Step::Done
            }
        }
    }

    #[test]
    fn test_suspend_until_notified() {
        let exec = Executor::new(config()).unwrap();
        let ids: Vec<_> = (0..3).map(|_| exec.spawn(gated).unwrap()).collect();
        exec.run_until_idle();
        assert_eq!(PASSED.load(Ordering::SeqCst), 0);
        assert!(ids
            .iter()
            .all(|id| exec.records().get(*id).state() == CoroutineState::Suspended));

        for expected in 1..=3 {
            GATE.notify(&exec);
            exec.run_until_idle();
            assert_eq!(PASSED.load(Ordering::SeqCst), expected);
        }
        assert_eq!(exec.live(), 0);
        assert_eq!(GATE.count(), 0);
    }

    fn marks_running(co: &Coroutine, sched: &dyn Scheduler) -> Step {
        match co.resume_point() {
            RESUME_START => {
                co.set_resume_point(1);
                // Woken before this step returns
                sched.wake(co.id());
                assert_eq!(co.state(), CoroutineState::Notified);
                Step::Suspend
            }
            _ => Step::Done,
        }
    }

    #[test]
    fn test_wake_during_step_is_not_lost() {
        let exec = Executor::new(config()).unwrap();
        exec.spawn(marks_running).unwrap();
        assert_eq!(exec.run_until_idle(), 2);
        assert_eq!(exec.live(), 0);
    }

    static TOKENS: FifoSemaphore = FifoSemaphore::new(0);
    static CONSUMED: AtomicUsize = AtomicUsize::new(0);

    fn consumer(co: &Coroutine, sched: &dyn Scheduler) -> Step {
        loop {
            match co.resume_point() {
                0..=9 => {
                    co.set_resume_point(co.resume_point() + 100);
                    if TOKENS.wait().evaluate(sched, co).would_block() {
                        return Step::Suspend;
                    }
                }
                p @ 100..=109 => {
                    CONSUMED.fetch_add(1, Ordering::SeqCst);
                    co.set_resume_point(p - 100 + 1);
                }
                _ => return Step::Done,
            }
        }
    }

    #[test]
    fn test_workers_drain_cross_thread_notifies() {
        let exec = Arc::new(Executor::new(config().num_workers(3)).unwrap());
        let pool = exec.start().unwrap();
        for _ in 0..4 {
            exec.spawn(consumer).unwrap();
        }

        let notifiers: Vec<_> = (0..4)
            .map(|_| {
                let exec = Arc::clone(&exec);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        TOKENS.notify(&*exec);
                    }
                })
            })
            .collect();
        for n in notifiers {
            n.join().unwrap();
        }

        assert!(exec.wait_all(Duration::from_secs(10)), "{:?}", exec);
        exec.shutdown(pool).unwrap();
        assert_eq!(CONSUMED.load(Ordering::SeqCst), 40);
        assert_eq!(TOKENS.count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(Executor::new(config().num_workers(0)).is_err());
    }
}
