//! Basic cosync example
//!
//! Three coroutines wait on one semaphore; the main thread releases them
//! one permit at a time while worker threads run them.
//!
//! # Environment Variables
//!
//! - `COSYNC_LOG_LEVEL=debug` - log level (off, error, warn, info, debug, trace)
//! - `COSYNC_FLUSH_EPRINT=1` - flush log lines immediately
//! - `COSYNC_NUM_WORKERS=N` - worker threads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cosync::{kdebug, kinfo, kwarn};
use cosync::{Coroutine, FifoSemaphore, MayBlock, Runtime, RuntimeConfig, Scheduler, Step};

static GATE: FifoSemaphore = FifoSemaphore::new(0);
static COMPLETED: AtomicUsize = AtomicUsize::new(0);

const WAITERS: usize = 3;

fn waiter(co: &Coroutine, sched: &dyn Scheduler) -> Step {
    match co.resume_point() {
        0 => {
            kdebug!("[{}] waiting at the gate", co.id());
            co.set_resume_point(1);
            match GATE.wait().evaluate(sched, co) {
                MayBlock::WouldBlock => Step::Suspend,
                MayBlock::NoBlock => waiter(co, sched),
            }
        }
        _ => {
            kdebug!("[{}] through the gate", co.id());
            COMPLETED.fetch_add(1, Ordering::SeqCst);
            Step::Done
        }
    }
}

// COSYNC_LOG_LEVEL=debug COSYNC_FLUSH_EPRINT=1 cargo run -p cosync-basic
fn main() {
    println!("=== cosync basic example ===\n");

    let config = RuntimeConfig::from_env().num_workers(2);
    config.print();
    let mut runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let finished = runtime.block_on(|exec| {
        let mut spawned = 0;
        for _ in 0..WAITERS {
            match exec.spawn(waiter) {
                Ok(id) => {
                    println!("spawned waiter {}", id);
                    spawned += 1;
                }
                Err(e) => kwarn!("spawn failed: {}", e),
            }
        }

        // Let every waiter reach the gate before opening it
        for _ in 0..1000 {
            if GATE.waiting() >= spawned {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        println!("{} waiters queued", GATE.waiting());

        for n in 1..=WAITERS {
            GATE.notify(exec);
            kinfo!("released permit {}", n);
        }
        exec.wait_all(Duration::from_secs(5))
    });

    println!(
        "\nfinished: {}, completed: {}/{}",
        finished,
        COMPLETED.load(Ordering::SeqCst),
        WAITERS
    );
    if !finished {
        std::process::exit(1);
    }
}
