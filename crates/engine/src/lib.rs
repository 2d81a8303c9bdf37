//! pexrs Engine - Subject Data Storage
//!
//! This crate handles:
//! - The [`DataStore`] contract every persistence backend implements
//! - Revision bookkeeping and atomic multi-record commits
//! - Change notification to subscribers
//! - The in-memory and JSON file backends
//!
//! # Architecture
//!
//! Backends keep their records in a [`state::StoreState`], an arena keyed by
//! [`SubjectRef`](pexrs_sdk::SubjectRef). Every write draws a fresh revision
//! from one monotonic counter, so revisions never repeat for a subject, even
//! after it is deleted and recreated.
//!
//! # Thread Safety
//!
//! Stores are `Send + Sync` and shared behind `Arc<dyn DataStore>`. A commit
//! holds the backend's write lock for its whole duration, so readers observe
//! either all of a batch or none of it.

pub mod error;
pub mod file;
pub mod memory;
pub mod notify;
pub mod snapshot;
pub mod state;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use notify::{ChangeEvent, ChangeListener, ChangeNotifier, ListenerKey};
pub use snapshot::{export_all, import_batch, import_into, Snapshot};
pub use store::{
    sanitize_data, validate_mutation, DataStore, RecordWrite, SubjectIter, WriteBatch,
};
