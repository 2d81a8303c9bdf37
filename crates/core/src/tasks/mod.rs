//! Background work and main thread hand-off
//!
//! Asynchronous permission checks run on a [`WorkerPool`]; their callbacks
//! are handed back through a [`CompletionQueue`] that the host drains on its
//! main thread every tick.

pub mod pool;
pub mod queue;

pub use pool::WorkerPool;
pub use queue::{CompletionQueue, QueueError, Task, QUEUE_CAPACITY};
