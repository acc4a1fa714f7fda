//! Portable parking on `std::sync::Condvar`

use super::WorkerParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct FallbackParking {
    epoch: Mutex<u32>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }

    fn lock_epoch(&self) -> MutexGuard<'_, u32> {
        // The guarded value is a plain counter; a poisoned lock is still usable.
        self.epoch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        let mut epoch = self.lock_epoch();
        *epoch = epoch.wrapping_add(1);
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FallbackParking {
    fn epoch(&self) -> u32 {
        *self.lock_epoch()
    }

    fn park(&self, seen: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut epoch = self.lock_epoch();

        while *epoch == seen {
            epoch = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.condvar
                        .wait_timeout(epoch, deadline - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self.condvar.wait(epoch).unwrap_or_else(|e| e.into_inner()),
            };
        }

        let woken = *epoch != seen;
        drop(epoch);
        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn wake_one(&self) {
        self.bump();
        self.condvar.notify_one();
    }

    fn wake_all(&self) {
        self.bump();
        self.condvar.notify_all();
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
