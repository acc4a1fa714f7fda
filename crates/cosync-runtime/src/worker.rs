//! Worker thread management
//!
//! Workers are named OS threads (`cosync-worker-N`) that each run the same
//! loop; the pool only starts and joins them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use cosync_core::{kerror, CoResult, WorkerError};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    num_workers: usize,
    /// Workers that have entered their loop
    started_count: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        Self {
            handles: Vec::with_capacity(num_workers),
            num_workers,
            started_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn every worker running `worker_fn(index)`
    ///
    /// On a spawn failure the threads already started keep running; the
    /// caller is expected to shut them down and [`join`](Self::join).
    pub fn start<F>(&mut self, worker_fn: F) -> CoResult<()>
    where
        F: Fn(usize) + Send + Sync + Clone + 'static,
    {
        for i in self.handles.len()..self.num_workers {
            let worker_fn = worker_fn.clone();
            let started = Arc::clone(&self.started_count);

            let handle = thread::Builder::new()
                .name(format!("cosync-worker-{}", i))
                .spawn(move || {
                    set_current_worker_id(i);
                    started.fetch_add(1, Ordering::Release);
                    worker_fn(i);
                })
                .map_err(|e| {
                    kerror!("failed to spawn worker {}: {}", i, e);
                    WorkerError::SpawnFailed
                })?;

            self.handles.push(handle);
        }
        Ok(())
    }

    /// Wait for every worker to exit
    ///
    /// Reports `Panicked` if any worker unwound; all are joined regardless.
    pub fn join(self) -> CoResult<()> {
        let mut result = Ok(());
        for handle in self.handles {
            if handle.join().is_err() {
                result = Err(WorkerError::Panicked.into());
            }
        }
        result
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    #[inline]
    pub fn started_count(&self) -> usize {
        self.started_count.load(Ordering::Acquire)
    }
}

thread_local! {
    static CURRENT_WORKER_ID: std::cell::Cell<usize> = const { std::cell::Cell::new(usize::MAX) };
}

pub fn set_current_worker_id(id: usize) {
    CURRENT_WORKER_ID.with(|cell| cell.set(id));
}

/// Index of the calling worker, `None` off the pool
#[inline]
pub fn current_worker_id() -> Option<usize> {
    let id = CURRENT_WORKER_ID.with(|cell| cell.get());
    (id != usize::MAX).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_workers_run_with_index_and_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pool = WorkerPool::new(3);
        let s = Arc::clone(&seen);
        pool.start(move |i| {
            let name = thread::current().name().map(str::to_owned);
            s.lock().unwrap().push((i, current_worker_id(), name));
        })
        .unwrap();
        pool.join().unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen.len(), 3);
        for (i, (index, id, name)) in seen.into_iter().enumerate() {
            assert_eq!(index, i);
            assert_eq!(id, Some(i));
            assert_eq!(name, Some(format!("cosync-worker-{}", i)));
        }
    }

    #[test]
    fn test_join_reports_panic() {
        let mut pool = WorkerPool::new(2);
        pool.start(|i| {
            if i == 1 {
                panic!("worker {} failed", i);
            }
        })
        .unwrap();
        assert_eq!(pool.join(), Err(WorkerError::Panicked.into()));
    }

    #[test]
    fn test_not_a_worker() {
        assert_eq!(current_worker_id(), None);
    }
}
