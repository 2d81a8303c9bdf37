//! Export and import of whole stores
//!
//! Used to migrate data between backends (for example from a memory store
//! seeded in tests to a file store, or between two file locations).

use serde::{Deserialize, Serialize};

use pexrs_sdk::{SubjectData, SubjectRef};

use crate::error::StoreResult;
use crate::notify::ChangeEvent;
use crate::store::{sanitize_data, DataStore, WriteBatch};

/// Every stored subject with its data, without revisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub subjects: Vec<(SubjectRef, SubjectData)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

/// Read every subject of every type
pub fn export_all(store: &dyn DataStore) -> StoreResult<Snapshot> {
    let mut subjects = Vec::new();
    for subject_type in store.subject_types()? {
        for subject in store.all_subjects(&subject_type)? {
            let data = store.get_data(&subject)?;
            subjects.push((subject, (*data.value).clone()));
        }
    }

    tracing::debug!("Exported {} subjects from '{}'", subjects.len(), store.name());
    Ok(Snapshot { subjects })
}

/// Build the batch that writes a snapshot over a store's current revisions
///
/// Every record is validated and normalized first; one malformed pattern or
/// option key fails the whole import with `InvalidPattern`.
pub fn import_batch(store: &dyn DataStore, snapshot: &Snapshot) -> StoreResult<WriteBatch> {
    let mut batch = WriteBatch::new();
    for (subject, data) in &snapshot.subjects {
        let data = sanitize_data(data)?;
        batch.put(subject.clone(), store.revision(subject)?, Some(data));
    }
    Ok(batch)
}

/// Write a snapshot into a store in one atomic commit
///
/// Existing subjects named in the snapshot are overwritten; others are left
/// alone.
pub fn import_into(store: &dyn DataStore, snapshot: &Snapshot) -> StoreResult<Vec<ChangeEvent>> {
    let events = store.apply(import_batch(store, snapshot)?)?;
    tracing::info!("Imported {} subjects into '{}'", events.len(), store.name());
    Ok(events)
}
