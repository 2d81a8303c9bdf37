//! Change notification
//!
//! Subscribers register a callback and receive one [`ChangeEvent`] per
//! subject written. Callbacks are stored in a slot map, the same way the
//! framework keys every other registered listener.
//!
//! # Example
//!
//! ```ignore
//! let key = store.subscribe(Arc::new(|event: &ChangeEvent| {
//!     tracing::info!("{} is now at {}", event.subject, event.revision);
//! }));
//!
//! store.unsubscribe(key);
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

use pexrs_sdk::{Revision, SubjectRef};

new_key_type! {
    /// Key for registered change listeners, used for removal
    pub struct ListenerKey;
}

/// A committed change to one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub subject: SubjectRef,
    /// Revision after the change
    pub revision: Revision,
    /// The subject's record no longer exists
    pub deleted: bool,
}

/// Callback invoked for each change
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Registry of change listeners
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RwLock<SlotMap<ListenerKey, ChangeListener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ChangeListener) -> ListenerKey {
        self.listeners.write().insert(listener)
    }

    /// Returns `true` if the listener was found and removed
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.listeners.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver events to every listener
    ///
    /// Listeners are collected before calling so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }

        let listeners: Vec<ChangeListener> = self.listeners.read().values().cloned().collect();
        tracing::trace!(
            "Notifying {} listener(s) of {} change(s)",
            listeners.len(),
            events.len()
        );

        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}
