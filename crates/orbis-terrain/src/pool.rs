//! Per-tile background work with cancellation.
//!
//! Jobs are keyed by [`TileKey`]. Cancelling a key drops its job if it has not
//! started and discards its result if it has. Results are collected on the render
//! thread with [`WorkerPool::drain`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use dashmap::DashMap;
use orbis_math::TileKey;

use crate::TerrainError;

struct Task<J> {
    key: TileKey,
    job: J,
    cancelled: Arc<AtomicBool>,
}

struct Done<R> {
    key: TileKey,
    result: R,
    cancelled: Arc<AtomicBool>,
}

/// Fixed set of threads running one job per [`TileKey`].
///
/// Results come back through [`WorkerPool::drain`]. A cancelled job is skipped if it
/// has not started and its result is dropped otherwise.
pub struct WorkerPool<J, R> {
    task_sender: Sender<Task<J>>,
    result_receiver: Receiver<Done<R>>,
    active: Arc<DashMap<TileKey, Arc<AtomicBool>>>,
    in_flight: Arc<AtomicU64>,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// Spawns `threads` workers running `work` on every submitted job.
    pub fn new<F>(name: &str, threads: usize, capacity: usize, work: F) -> Self
    where
        F: Fn(TileKey, J) -> R + Send + Sync + 'static,
    {
        let (task_sender, task_receiver) = bounded::<Task<J>>(capacity);
        let (result_sender, result_receiver) = bounded::<Done<R>>(capacity);
        let in_flight = Arc::new(AtomicU64::new(0));
        let work = Arc::new(work);

        for _ in 0..threads.max(1) {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let in_flight = Arc::clone(&in_flight);
            let work = Arc::clone(&work);

            std::thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        if !task.cancelled.load(Ordering::Relaxed) {
                            let result = work(task.key, task.job);
                            if !task.cancelled.load(Ordering::Relaxed) {
                                let _ = sender.send(Done {
                                    key: task.key,
                                    result,
                                    cancelled: task.cancelled,
                                });
                            }
                        }
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })
                .expect("failed to spawn terrain worker thread");
        }

        Self {
            task_sender,
            result_receiver,
            active: Arc::new(DashMap::new()),
            in_flight,
        }
    }

    /// One worker per core, leaving two cores for the render and main threads.
    pub fn default_threads() -> usize {
        num_cpus::get().saturating_sub(2).max(1)
    }

    /// Queues a job. A pending job for the same key is cancelled first.
    pub fn submit(&self, key: TileKey, job: J) -> Result<(), TerrainError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.active.insert(key, Arc::clone(&cancelled)) {
            previous.store(true, Ordering::Relaxed);
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let task = Task {
            key,
            job,
            cancelled: Arc::clone(&cancelled),
        };
        self.task_sender.try_send(task).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            self.active
                .remove_if(&key, |_, flag| Arc::ptr_eq(flag, &cancelled));
            match e {
                TrySendError::Full(_) => TerrainError::QueueFull(self.in_flight_count()),
                TrySendError::Disconnected(_) => TerrainError::Disconnected,
            }
        })
    }

    pub fn cancel(&self, key: &TileKey) {
        if let Some((_, cancelled)) = self.active.remove(key) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    /// Collects finished results, skipping cancelled ones.
    pub fn drain(&self) -> Vec<(TileKey, R)> {
        let mut results = Vec::new();
        while let Ok(done) = self.result_receiver.try_recv() {
            if done.cancelled.load(Ordering::Relaxed) {
                continue;
            }
            self.active
                .remove_if(&done.key, |_, flag| Arc::ptr_eq(flag, &done.cancelled));
            results.push((done.key, done.result));
        }
        results
    }

    pub fn is_pending(&self, key: &TileKey) -> bool {
        self.active.contains_key(key)
    }

    /// Jobs queued or executing.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) fn drain_until<J: Send + 'static, R: Send + 'static>(
    pool: &WorkerPool<J, R>,
    expected: usize,
) -> Vec<(TileKey, R)> {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let mut out = Vec::new();
    while out.len() < expected && std::time::Instant::now() < deadline {
        out.extend(pool.drain());
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_come_back_keyed() {
        let pool = WorkerPool::new("test-pool", 2, 16, |key: TileKey, n: u32| key.x + n);
        for x in 0..5 {
            pool.submit(TileKey::new(3, x, 0), 100).unwrap();
        }
        let mut results = drain_until(&pool, 5);
        results.sort_by_key(|(k, _)| *k);
        assert_eq!(results.len(), 5);
        for (key, value) in results {
            assert_eq!(value, key.x + 100);
        }
        assert!(!pool.is_pending(&TileKey::new(3, 0, 0)));
    }

    #[test]
    fn test_cancelled_results_are_dropped() {
        let pool = WorkerPool::new("test-pool", 1, 16, |_key: TileKey, ms: u64| {
            std::thread::sleep(std::time::Duration::from_millis(ms));
            ms
        });
        let slow = TileKey::new(1, 0, 0);
        let fast = TileKey::new(1, 1, 0);
        pool.submit(slow, 50).unwrap();
        pool.submit(fast, 1).unwrap();
        pool.cancel(&slow);
        assert!(!pool.is_pending(&slow));
        let results = drain_until(&pool, 1);
        std::thread::sleep(std::time::Duration::from_millis(80));
        let late = pool.drain();
        assert!(results.iter().chain(late.iter()).all(|(k, _)| *k == fast));
    }

    #[test]
    fn test_full_queue_is_reported() {
        let pool = WorkerPool::new("test-pool", 1, 1, |_key: TileKey, ms: u64| {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        });
        let mut rejected = 0;
        for x in 0..8 {
            if let Err(TerrainError::QueueFull(_)) = pool.submit(TileKey::new(3, x, 0), 200) {
                rejected += 1;
            }
        }
        assert!(rejected > 0);
    }
}
