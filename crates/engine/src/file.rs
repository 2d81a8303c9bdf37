//! JSON file backend
//!
//! The whole store lives in one JSON document. Each commit serializes the
//! post-commit state to a sibling temporary file and renames it over the data
//! file; only once the rename succeeds is the in-memory state swapped. An I/O
//! failure therefore leaves both disk and memory exactly as they were.
//!
//! Writers are serialized on their own mutex and build the next state from a
//! read lock, so readers are only blocked for the final swap, never for disk
//! I/O.
//!
//! # File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "last-revision": 42,
//!   "subjects": [ { "subject": {"type": "group", "identifier": "admin"},
//!                   "revision": 40, "data": { ... } } ],
//!   "tombstones": [ ... ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use pexrs_sdk::{Revision, SubjectData, SubjectRef, Versioned};

use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::state::{StateFile, StoreState};
use crate::store::{DataStore, SubjectIter, WriteBatch};

/// Store persisted to a single JSON file
pub struct FileStore {
    name: String,
    path: PathBuf,
    state: RwLock<StoreState>,
    /// Held by commits and reloads for their whole duration
    writer: Mutex<()>,
    notifier: ChangeNotifier,
}

impl FileStore {
    /// Open a store, reading the file if it exists
    ///
    /// A missing file yields an empty store; the file is created on the first
    /// commit.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> StoreResult<Self> {
        let name = name.into();
        let path = path.into();
        let state = read_state(&name, &path)?;

        tracing::info!(
            "Opened file store '{}' at {:?} ({} subjects)",
            name,
            path,
            state.len()
        );

        Ok(Self {
            name,
            path,
            state: RwLock::new(state),
            writer: Mutex::new(()),
            notifier: ChangeNotifier::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk
    pub fn save(&self) -> StoreResult<()> {
        let _writer = self.writer.lock();
        let state = self.state.read().clone();
        write_state(&self.name, &self.path, &state)
    }
}

fn read_state(name: &str, path: &Path) -> StoreResult<StoreState> {
    if !path.exists() {
        return Ok(StoreState::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| StoreError::unavailable(name, e))?;
    let file: StateFile =
        serde_json::from_str(&content).map_err(|e| StoreError::unavailable(name, e))?;
    Ok(StoreState::from_file(file))
}

fn write_state(name: &str, path: &Path, state: &StoreState) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::unavailable(name, e))?;
        }
    }

    let content = serde_json::to_string_pretty(&state.to_file())
        .map_err(|e| StoreError::unavailable(name, e))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content).map_err(|e| StoreError::unavailable(name, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        StoreError::unavailable(name, e)
    })?;

    tracing::trace!("Saved store '{}' to {:?}", name, path);
    Ok(())
}

impl DataStore for FileStore {
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
        let _writer = self.writer.lock();

        // Only writers change `state`, and we are the only writer
        let mut next = {
            let state = self.state.read();
            state.check(&batch)?;
            state.clone()
        };
        let events = next.apply(batch);
        write_state(&self.name, &self.path, &next)?;
        *self.state.write() = next;

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

    /// Re-read the file and notify subscribers of every subject that changed
    fn reload(&self) -> StoreResult<Vec<ChangeEvent>> {
        let writer = self.writer.lock();
        let fresh = read_state(&self.name, &self.path)?;
        let events = {
            let mut state = self.state.write();
            let events = fresh.diff(&state);
            *state = fresh;
            events
        };
        drop(writer);

        tracing::info!("Reloaded file store '{}' ({} changes)", self.name, events.len());
        self.notifier.notify(&events);
        Ok(events)
    }
}
