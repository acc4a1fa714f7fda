//! Idle worker parking
//!
//! A worker that finds the ready queue empty sleeps here until a coroutine
//! is queued. Parking is epoch based: the worker samples [`WorkerParking::epoch`]
//! before its last look at the queue and passes the sample to `park`, which
//! returns immediately if any wake happened in between. A wake can therefore
//! never fall into the gap between "queue empty" and "asleep".

use std::time::Duration;

pub trait WorkerParking: Send + Sync {
    /// Current wake epoch; bumped by every `wake_one`/`wake_all`
    fn epoch(&self) -> u32;

    /// Sleep while the epoch still equals `seen`, at most `timeout`
    ///
    /// Returns `true` if the epoch moved (a wake happened), `false` on
    /// timeout or spurious return. Callers re-check for work either way.
    fn park(&self, seen: u32, timeout: Option<Duration>) -> bool;

    fn wake_one(&self);

    fn wake_all(&self);

    /// Workers currently inside `park` (hint)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_times_out() {
        let parking = new_parking();
        let seen = parking.epoch();
        let start = Instant::now();
        assert!(!parking.park(seen, Some(Duration::from_millis(30))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stale_epoch_returns_immediately() {
        let parking = PlatformParking::new();
        let seen = parking.epoch();
        parking.wake_one();
        let start = Instant::now();
        assert!(parking.park(seen, Some(Duration::from_secs(10))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wake_one_releases_parked_thread() {
        let parking = Arc::new(PlatformParking::new());
        let p2 = Arc::clone(&parking);
        let handle = thread::spawn(move || {
            let seen = p2.epoch();
            p2.park(seen, Some(Duration::from_secs(10)))
        });

        while parking.parked_count() == 0 {
            thread::yield_now();
        }
        parking.wake_one();
        assert!(handle.join().unwrap());
        assert_eq!(parking.parked_count(), 0);
    }

    #[test]
    fn test_wake_all() {
        let parking = Arc::new(PlatformParking::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let p = Arc::clone(&parking);
                thread::spawn(move || {
                    let seen = p.epoch();
                    p.park(seen, Some(Duration::from_secs(10)))
                })
            })
            .collect();

        while parking.parked_count() < 3 {
            thread::yield_now();
        }
        parking.wake_all();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
