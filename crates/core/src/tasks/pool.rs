//! Worker pool
//!
//! A fixed set of named threads pulling jobs from one unbounded channel.
//! Dropping the pool closes the channel; workers finish the jobs already
//! queued and exit, and the drop joins them. Jobs that wait on the owner
//! (e.g. for room in a bounded queue) need [`WorkerPool::shutdown_with`]
//! instead, so the owner keeps making room while it waits.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};

use super::queue::{QueueError, Task};

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one) named `{name}-{n}`
    pub fn new(name: &str, threads: usize) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let mut workers = Vec::new();

        for n in 0..threads.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, n))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!("Started {} '{}' worker(s)", workers.len(), name);
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run `job` on a worker thread
    pub fn execute<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return Err(QueueError::Disconnected);
        };
        sender
            .send(Box::new(job))
            .map_err(|_| QueueError::Disconnected)
    }

    /// Stop accepting jobs and wait for the workers to finish, calling
    /// `while_waiting` until they all have
    ///
    /// Later [`execute`](Self::execute) calls fail with
    /// [`QueueError::Disconnected`]. Calling it again is a no-op.
    pub fn shutdown_with<F>(&mut self, mut while_waiting: F)
    where
        F: FnMut(),
    {
        self.sender.take();
        while self.workers.iter().any(|w| !w.is_finished()) {
            while_waiting();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.join_all();
    }

    fn join_all(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        self.join_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_all_jobs_before_drop_returns() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 3).unwrap();
            assert_eq!(pool.size(), 3);
            for _ in 0..20 {
                let counter = count.clone();
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_zero_threads_still_runs() {
        let pool = WorkerPool::new("test", 0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_shutdown_with_unblocks_waiting_jobs() {
        let (results, drained) = crossbeam_channel::bounded::<usize>(1);
        let mut pool = WorkerPool::new("test", 2).unwrap();
        for n in 0..50 {
            let results = results.clone();
            pool.execute(move || {
                let _ = results.send(n);
            })
            .unwrap();
        }
        drop(results);

        let mut seen = 0;
        pool.shutdown_with(|| seen += drained.try_iter().count());
        seen += drained.try_iter().count();

        assert_eq!(seen, 50);
        assert_eq!(pool.size(), 0);
        assert!(matches!(pool.execute(|| {}), Err(QueueError::Disconnected)));
    }
}
