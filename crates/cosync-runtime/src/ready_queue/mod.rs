//! Global ready queue
//!
//! Unbounded lock-free MPMC queue of runnable coroutine ids, paired with
//! the parking used by idle workers. Pushing always signals one parked
//! worker.

use std::time::Duration;
use crossbeam_queue::SegQueue;
use cosync_core::CoroutineId;
use crate::parking::{new_parking, WorkerParking};

pub struct ReadyQueue {
    queue: SegQueue<CoroutineId>,
    parking: Box<dyn WorkerParking>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::with_parking(new_parking())
    }

    pub fn with_parking(parking: Box<dyn WorkerParking>) -> Self {
        Self {
            queue: SegQueue::new(),
            parking,
        }
    }

    /// Queue `id` and wake one parked worker
    pub fn push(&self, id: CoroutineId) {
        debug_assert!(id.is_some());
        self.queue.push(id);
        self.parking.wake_one();
    }

    #[inline]
    pub fn pop(&self) -> Option<CoroutineId> {
        self.queue.pop()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sample taken before a worker's last empty check; see [`WorkerParking`]
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.parking.epoch()
    }

    pub fn park(&self, seen: u32, timeout: Duration) -> bool {
        self.parking.park(seen, Some(timeout))
    }

    pub fn wake_all(&self) {
        self.parking.wake_all();
    }

    pub fn parked_count(&self) -> usize {
        self.parking.parked_count()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_pop() {
        let q = ReadyQueue::new();
        assert!(q.is_empty());
        for i in 0..3 {
            q.push(CoroutineId::new(i));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(CoroutineId::new(0)));
        assert_eq!(q.pop(), Some(CoroutineId::new(1)));
        assert_eq!(q.pop(), Some(CoroutineId::new(2)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_push_moves_epoch() {
        let q = ReadyQueue::new();
        let seen = q.epoch();
        q.push(CoroutineId::new(7));
        // Already woken: must not sleep
        assert!(q.park(seen, Duration::from_secs(10)));
    }

    #[test]
    fn test_push_wakes_parked_consumer() {
        let q = Arc::new(ReadyQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || loop {
                if let Some(id) = q.pop() {
                    return id;
                }
                let seen = q.epoch();
                if q.is_empty() {
                    q.park(seen, Duration::from_secs(10));
                }
            })
        };

        while q.parked_count() == 0 {
            thread::yield_now();
        }
        q.push(CoroutineId::new(42));
        assert_eq!(consumer.join().unwrap(), CoroutineId::new(42));
    }
}
