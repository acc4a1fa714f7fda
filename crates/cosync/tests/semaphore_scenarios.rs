//! End-to-end semaphore behaviour on the executor

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cosync::{
    Coroutine, CoroutineId, FifoSemaphore, MayBlock, RawFifoSemaphore, Runtime, RuntimeConfig,
    Scheduler, Semaphore, Step, RESUME_START,
};

fn single_thread() -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .num_workers(1)
            .max_coroutines(32)
            .park_timeout(Duration::from_millis(2)),
    )
    .unwrap()
}

// --- three waiters, three notifies, in arrival order ------------------------

static TURNSTILE: RawFifoSemaphore = RawFifoSemaphore::uninit();
static ORDER: Mutex<Vec<CoroutineId>> = Mutex::new(Vec::new());

fn queued_waiter(co: &Coroutine, sched: &dyn Scheduler) -> Step {
    if co.resume_point() == RESUME_START {
        co.set_resume_point(1);
        if TURNSTILE.wait().evaluate(sched, co).would_block() {
            return Step::Suspend;
        }
    }
    ORDER.lock().unwrap().push(co.id());
    Step::Done
}

#[test]
fn three_waiters_resume_in_arrival_order() {
    TURNSTILE.initialise(0);
    let rt = single_thread();
    let exec = rt.executor();

    let ids: Vec<_> = (0..3).map(|_| rt.spawn(queued_waiter).unwrap()).collect();
    exec.run_until_idle();
    assert!(ORDER.lock().unwrap().is_empty());
    assert_eq!(TURNSTILE.waiting(), 3);

    for n in 1..=3 {
        TURNSTILE.notify(&rt);
        exec.run_until_idle();
        assert_eq!(ORDER.lock().unwrap().len(), n);
    }
    assert_eq!(*ORDER.lock().unwrap(), ids);
    assert_eq!(TURNSTILE.count(), 0);
    assert_eq!(exec.live(), 0);
}

// --- permits banked before anyone waits --------------------------------------

static BANKED: Semaphore = Semaphore::new(0);
static BANKED_DONE: AtomicUsize = AtomicUsize::new(0);

fn banked_waiter(co: &Coroutine, sched: &dyn Scheduler) -> Step {
    match BANKED.wait().evaluate(sched, co) {
        MayBlock::NoBlock => {
            BANKED_DONE.fetch_add(1, Ordering::SeqCst);
            Step::Done
        }
        MayBlock::WouldBlock => panic!("{} should have found a banked permit", co.id()),
    }
}

#[test]
fn banked_permits_never_suspend() {
    let rt = single_thread();
    for _ in 0..4 {
        BANKED.notify(&rt);
    }
    assert_eq!(BANKED.count(), 4);

    for _ in 0..4 {
        rt.spawn(banked_waiter).unwrap();
    }
    rt.executor().run_until_idle();
    assert_eq!(BANKED_DONE.load(Ordering::SeqCst), 4);
    assert_eq!(BANKED.count(), 0);
    assert_eq!(BANKED.waiting(), 0);
}

// --- many threads notifying, workers consuming --------------------------------

const CONSUMERS: usize = 8;
const ROUNDS: u32 = 25;
const NOTIFIERS: usize = 4;

static WORK: FifoSemaphore = FifoSemaphore::new(0);
static TAKEN: AtomicUsize = AtomicUsize::new(0);

fn looping_consumer(co: &Coroutine, sched: &dyn Scheduler) -> Step {
    // Resume points: 2k = about to wait for permit k, 2k+1 = holds permit k
    loop {
        let point = co.resume_point();
        if point == 2 * ROUNDS {
            return Step::Done;
        }
        if point % 2 == 0 {
            co.set_resume_point(point + 1);
            if WORK.wait().evaluate(sched, co).would_block() {
                return Step::Suspend;
            }
        } else {
            TAKEN.fetch_add(1, Ordering::SeqCst);
            co.set_resume_point(point + 1);
        }
    }
}

#[test]
fn permits_are_conserved_across_threads() {
    let mut rt = Runtime::new(
        RuntimeConfig::new()
            .num_workers(4)
            .max_coroutines(64)
            .idle_spins(8)
            .park_timeout(Duration::from_millis(1)),
    )
    .unwrap();
    rt.start().unwrap();
    assert!(rt.start().is_err());

    for _ in 0..CONSUMERS {
        rt.spawn(looping_consumer).unwrap();
    }

    let total = CONSUMERS * ROUNDS as usize;
    let exec = rt.executor().clone();
    std::thread::scope(|s| {
        for _ in 0..NOTIFIERS {
            s.spawn(|| {
                for _ in 0..total / NOTIFIERS {
                    WORK.notify(&exec);
                }
            });
        }
    });

    assert!(rt.wait_all(Duration::from_secs(20)), "{:?} {:?}", rt.executor(), WORK);
    rt.shutdown().unwrap();
    assert_eq!(TAKEN.load(Ordering::SeqCst), total);
    assert_eq!(WORK.count(), 0);
    assert_eq!(WORK.waiting(), 0);
}
