//! Main thread completion queue
//!
//! Worker threads queue continuations here; the host drains them on its main
//! thread once per tick, so callbacks never run concurrently with game logic.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// A task to execute on the main thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Default capacity of the completion queue
pub const QUEUE_CAPACITY: usize = 1024;

/// Queueing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity; the task was dropped
    #[error("Task queue full")]
    Full,

    #[error("Task queue disconnected")]
    Disconnected,
}

/// Bounded multi-producer queue drained by the main thread
pub struct CompletionQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    capacity: usize,
}

impl CompletionQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Queue a task to execute on the next tick
    ///
    /// This is safe to call from any thread.
    #[tracing::instrument(skip_all)]
    pub fn queue_task<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Task queue full, dropping task");
                Err(QueueError::Full)
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("Task queue disconnected");
                Err(QueueError::Disconnected)
            }
        }
    }

    /// Queue a task, blocking if the queue is full
    ///
    /// # Warning
    /// Only call from worker threads, never from the main thread
    /// (would deadlock if the queue is full and waiting for a tick to drain it)
    #[tracing::instrument(skip_all)]
    pub fn queue_task_blocking<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Box::new(task)).map_err(|e| {
            tracing::error!("Failed to queue task (blocking): {}", e);
            QueueError::Disconnected
        })
    }

    /// Run queued tasks
    ///
    /// Called on the main thread. Runs at most one queue's worth of tasks so
    /// that tasks queueing more tasks cannot stall the tick. Returns the
    /// number of tasks processed.
    #[tracing::instrument(skip_all)]
    pub fn process_queued_tasks(&self) -> usize {
        let mut count = 0;

        while let Ok(task) = self.receiver.try_recv() {
            task();
            count += 1;

            if count >= self.capacity {
                break;
            }
        }

        count
    }

    /// Check how many tasks are currently queued
    pub fn queued_task_count(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new(QUEUE_CAPACITY)
    }
}
