//! In-memory backend

use std::sync::Arc;

use parking_lot::RwLock;

use pexrs_sdk::{Revision, SubjectData, SubjectRef, Versioned};

use crate::error::StoreResult;
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::state::StoreState;
use crate::store::{DataStore, SubjectIter, WriteBatch};

/// Volatile store; everything is lost when it is dropped
pub struct MemoryStore {
    name: String,
    state: RwLock<StoreState>,
    notifier: ChangeNotifier,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(StoreState::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Number of stored subjects
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_data(&self, subject: &SubjectRef) -> StoreResult<Versioned<Arc<SubjectData>>> {
        Ok(self.state.read().get(subject))
    }

    fn revision(&self, subject: &SubjectRef) -> StoreResult<Revision> {
        Ok(self.state.read().revision(subject))
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<Vec<ChangeEvent>> {
        let mut state = self.state.write();
        state.check(&batch)?;
        let events = state.apply(batch);
        tracing::debug!("[{}] committed {} record(s)", self.name, events.len());
        Ok(events)
    }

    fn all_subjects(&self, subject_type: &str) -> StoreResult<SubjectIter<'_>> {
        let subjects = self.state.read().subjects_of_type(subject_type);
        Ok(Box::new(subjects.into_iter()))
    }

    fn subject_types(&self) -> StoreResult<Vec<String>> {
        Ok(self.state.read().subject_types())
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}
