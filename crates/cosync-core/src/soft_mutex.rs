//! Soft mutex guarding wait-queue critical sections
//!
//! A test-and-test-and-set lock for critical sections that are a handful of
//! instructions long (linking or unlinking one record). It never parks the
//! thread in the kernel; after a bounded number of backoff rounds it only
//! yields the OS thread so a preempted holder can finish.
//!
//! This is not coroutine-aware. A coroutine that needs to wait for a
//! resource uses a [`Semaphore`](crate::semaphore::Semaphore), which holds
//! a soft mutex only for the enqueue/dequeue itself.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Backoff rounds before falling back to `yield_now`
const SPIN_ROUNDS_BEFORE_YIELD: u32 = 16;

/// A spin-style mutual exclusion primitive
pub struct SoftMutex<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: SoftMutex provides exclusive access to T
unsafe impl<T: Send> Send for SoftMutex<T> {}
unsafe impl<T: Send> Sync for SoftMutex<T> {}

impl<T> SoftMutex<T> {
    /// Create an unlocked soft mutex. Usable in `static` items.
    #[inline]
    pub const fn new(value: T) -> Self {
        SoftMutex {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it is available
    #[inline]
    pub fn lock(&self) -> SoftMutexGuard<'_, T> {
        if self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return SoftMutexGuard { mutex: self };
        }
        self.lock_contended()
    }

    #[cold]
    fn lock_contended(&self) -> SoftMutexGuard<'_, T> {
        let mut rounds = 0u32;
        loop {
            // Read-only spin until the holder releases, then race for it.
            while self.locked.load(Ordering::Relaxed) {
                if rounds < SPIN_ROUNDS_BEFORE_YIELD {
                    for _ in 0..(1u32 << rounds.min(6)) {
                        core::hint::spin_loop();
                    }
                    rounds += 1;
                } else {
                    std::thread::yield_now();
                }
            }

            if self.locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SoftMutexGuard { mutex: self };
            }
        }
    }

    /// Try to acquire the lock without spinning
    #[inline]
    pub fn try_lock(&self) -> Option<SoftMutexGuard<'_, T>> {
        if self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SoftMutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Check if the lock is currently held
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Force the mutex back to the unlocked state
    ///
    /// Used by plain (explicitly initialised) primitives whose storage may
    /// hold stale bytes. Caller must guarantee no guard is alive and no
    /// other thread is using the mutex.
    #[inline]
    pub(crate) fn reset(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SoftMutex<T> {
    fn default() -> Self {
        SoftMutex::new(T::default())
    }
}

/// Guard that releases the soft mutex when dropped
///
/// Holding a `&SoftMutexGuard<'_, ()>` is how condition-variable operations
/// prove they run under external mutual exclusion.
pub struct SoftMutexGuard<'a, T> {
    mutex: &'a SoftMutex<T>,
}

impl<'a, T> SoftMutexGuard<'a, T> {
    /// True if this guard was produced by `mutex`
    #[inline]
    pub fn guards(&self, mutex: &SoftMutex<T>) -> bool {
        core::ptr::eq(self.mutex, mutex)
    }
}

impl<'a, T> Deref for SoftMutexGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for SoftMutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for SoftMutexGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
    }
}
