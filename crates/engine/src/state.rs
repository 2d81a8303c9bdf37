//! Shared record arena used by the built-in backends

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use pexrs_sdk::{Revision, SubjectData, SubjectRef, Versioned};

use crate::error::{StoreError, StoreResult};
use crate::notify::ChangeEvent;
use crate::store::WriteBatch;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct Record {
    revision: Revision,
    data: Arc<SubjectData>,
}

/// All records of a store plus its revision counter
///
/// Deleted subjects leave a tombstone with their final revision so that a
/// later recreation continues from a higher number. Tombstones live as long
/// as the store (one subject key and revision each); without one, a deleted
/// subject would read as [`Revision::NONE`] again and a compare-and-set made
/// against the never-written state would wrongly succeed.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    last_revision: u64,
    records: HashMap<SubjectRef, Record>,
    tombstones: HashMap<SubjectRef, Revision>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: &SubjectRef) -> Versioned<Arc<SubjectData>> {
        match self.records.get(subject) {
            Some(record) => Versioned::new(record.revision, record.data.clone()),
            None => Versioned::new(self.revision(subject), Arc::new(SubjectData::default())),
        }
    }

    pub fn revision(&self, subject: &SubjectRef) -> Revision {
        self.records
            .get(subject)
            .map(|r| r.revision)
            .or_else(|| self.tombstones.get(subject).copied())
            .unwrap_or(Revision::NONE)
    }

    pub fn last_revision(&self) -> Revision {
        Revision(self.last_revision)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Verify every expected revision in a batch, written or only read
    pub fn check(&self, batch: &WriteBatch) -> StoreResult<()> {
        let writes = batch.writes().iter().map(|w| (&w.subject, w.expected));
        let reads = batch.reads().iter().map(|(s, r)| (s, *r));
        for (subject, expected) in writes.chain(reads) {
            let actual = self.revision(subject);
            if actual != expected {
                return Err(StoreError::StaleWrite {
                    subject: subject.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Apply a checked batch, allocating a fresh revision per record
    ///
    /// Writing empty data removes the record.
    pub fn apply(&mut self, batch: WriteBatch) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(batch.len());

        for write in batch.into_writes() {
            self.last_revision += 1;
            let revision = Revision(self.last_revision);

            let deleted = match write.data {
                Some(data) if !data.is_empty() => {
                    self.tombstones.remove(&write.subject);
                    self.records.insert(
                        write.subject.clone(),
                        Record {
                            revision,
                            data: Arc::new(data),
                        },
                    );
                    false
                }
                _ => {
                    self.records.remove(&write.subject);
                    self.tombstones.insert(write.subject.clone(), revision);
                    true
                }
            };

            events.push(ChangeEvent {
                subject: write.subject,
                revision,
                deleted,
            });
        }

        events
    }

    /// Subjects of one type, sorted for stable enumeration
    pub fn subjects_of_type(&self, subject_type: &str) -> Vec<SubjectRef> {
        let mut subjects: Vec<SubjectRef> = self
            .records
            .keys()
            .filter(|s| s.subject_type() == subject_type)
            .cloned()
            .collect();
        subjects.sort();
        subjects
    }

    pub fn subject_types(&self) -> Vec<String> {
        self.records
            .keys()
            .map(|s| s.subject_type().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Events describing how `self` differs from `previous`
    pub fn diff(&self, previous: &StoreState) -> Vec<ChangeEvent> {
        let mut subjects: BTreeSet<&SubjectRef> = self.records.keys().collect();
        subjects.extend(previous.records.keys());
        subjects.extend(self.tombstones.keys());

        subjects
            .into_iter()
            .filter_map(|subject| {
                let revision = self.revision(subject);
                (revision != previous.revision(subject)).then(|| ChangeEvent {
                    subject: subject.clone(),
                    revision,
                    deleted: !self.records.contains_key(subject),
                })
            })
            .collect()
    }

    pub fn to_file(&self) -> StateFile {
        let mut subjects: Vec<StoredSubject> = self
            .records
            .iter()
            .map(|(subject, record)| StoredSubject {
                subject: subject.clone(),
                revision: record.revision,
                data: (*record.data).clone(),
            })
            .collect();
        subjects.sort_by(|a, b| a.subject.cmp(&b.subject));

        let mut tombstones: Vec<Tombstone> = self
            .tombstones
            .iter()
            .map(|(subject, revision)| Tombstone {
                subject: subject.clone(),
                revision: *revision,
            })
            .collect();
        tombstones.sort_by(|a, b| a.subject.cmp(&b.subject));

        StateFile {
            version: FORMAT_VERSION,
            last_revision: self.last_revision,
            subjects,
            tombstones,
        }
    }

    pub fn from_file(file: StateFile) -> Self {
        let mut state = Self::new();
        for stored in file.subjects {
            state.last_revision = state.last_revision.max(stored.revision.get());
            state.records.insert(
                stored.subject,
                Record {
                    revision: stored.revision,
                    data: Arc::new(stored.data),
                },
            );
        }
        for tombstone in file.tombstones {
            state.last_revision = state.last_revision.max(tombstone.revision.get());
            state.tombstones.insert(tombstone.subject, tombstone.revision);
        }
        state.last_revision = state.last_revision.max(file.last_revision);
        state
    }
}

/// Serialized form of a [`StoreState`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StateFile {
    pub version: u32,
    pub last_revision: u64,
    #[serde(default)]
    pub subjects: Vec<StoredSubject>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSubject {
    pub subject: SubjectRef,
    pub revision: Revision,
    pub data: SubjectData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    pub subject: SubjectRef,
    pub revision: Revision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexrs_sdk::ContextSet;

    fn data_with(permission: &str) -> SubjectData {
        let mut data = SubjectData::new();
        data.set_permission(&ContextSet::empty(), permission, Some(true), 0);
        data
    }

    #[test]
    fn test_apply_allocates_monotonic_revisions() {
        let mut state = StoreState::new();
        let alice = SubjectRef::user("alice");
        let bob = SubjectRef::user("bob");

        let mut batch = WriteBatch::new();
        batch.put(alice.clone(), Revision::NONE, Some(data_with("a")));
        batch.put(bob.clone(), Revision::NONE, Some(data_with("b")));
        let events = state.apply(batch);

        assert_eq!(events.len(), 2);
        assert_eq!(state.revision(&alice), Revision(1));
        assert_eq!(state.revision(&bob), Revision(2));
    }

    #[test]
    fn test_check_detects_stale() {
        let mut state = StoreState::new();
        let alice = SubjectRef::user("alice");

        let mut batch = WriteBatch::new();
        batch.put(alice.clone(), Revision::NONE, Some(data_with("a")));
        state.apply(batch.clone());

        assert!(matches!(
            state.check(&batch),
            Err(StoreError::StaleWrite { actual: Revision(1), .. })
        ));
    }

    #[test]
    fn test_check_detects_moved_read() {
        let mut state = StoreState::new();
        let (alice, admin) = (SubjectRef::user("alice"), SubjectRef::group("admin"));

        let mut seed = WriteBatch::new();
        seed.put(admin.clone(), Revision::NONE, Some(data_with("a")));
        state.apply(seed);

        let mut batch = WriteBatch::new();
        batch.put(alice.clone(), Revision::NONE, Some(data_with("b")));
        batch.expect(admin.clone(), Revision(1));
        assert!(state.check(&batch).is_ok());

        let mut bump = WriteBatch::new();
        bump.put(admin.clone(), Revision(1), Some(data_with("c")));
        state.apply(bump);

        assert!(matches!(
            state.check(&batch),
            Err(StoreError::StaleWrite { subject, actual: Revision(2), .. }) if subject == admin
        ));
    }

    #[test]
    fn test_delete_never_reuses_revision() {
        let mut state = StoreState::new();
        let alice = SubjectRef::user("alice");

        let mut create = WriteBatch::new();
        create.put(alice.clone(), Revision::NONE, Some(data_with("a")));
        state.apply(create);

        let mut delete = WriteBatch::new();
        delete.put(alice.clone(), Revision(1), None);
        let events = state.apply(delete);
        assert!(events[0].deleted);
        assert_eq!(state.revision(&alice), Revision(2));
        assert!(state.get(&alice).value.is_empty());

        // A writer that read before the subject existed must not win
        let mut stale = WriteBatch::new();
        stale.put(alice.clone(), Revision::NONE, Some(data_with("c")));
        assert!(matches!(
            state.check(&stale),
            Err(StoreError::StaleWrite { actual: Revision(2), .. })
        ));

        let mut recreate = WriteBatch::new();
        recreate.put(alice.clone(), Revision(2), Some(data_with("b")));
        state.apply(recreate);
        assert_eq!(state.revision(&alice), Revision(3));
    }

    #[test]
    fn test_file_roundtrip_preserves_counter() {
        let mut state = StoreState::new();
        let alice = SubjectRef::user("alice");

        let mut batch = WriteBatch::new();
        batch.put(alice.clone(), Revision::NONE, Some(data_with("a")));
        state.apply(batch);
        let mut delete = WriteBatch::new();
        delete.put(alice.clone(), Revision(1), None);
        state.apply(delete);

        let restored = StoreState::from_file(state.to_file());
        assert_eq!(restored.last_revision(), Revision(2));
        assert_eq!(restored.revision(&alice), Revision(2));
        assert!(restored.is_empty());
    }

    #[test]
    fn test_diff() {
        let mut before = StoreState::new();
        let alice = SubjectRef::user("alice");
        let bob = SubjectRef::user("bob");

        let mut batch = WriteBatch::new();
        batch.put(alice.clone(), Revision::NONE, Some(data_with("a")));
        before.apply(batch);

        let mut after = before.clone();
        let mut batch = WriteBatch::new();
        batch.put(bob.clone(), Revision::NONE, Some(data_with("b")));
        after.apply(batch);

        let events = after.diff(&before);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, bob);
    }

    #[test]
    fn test_subject_enumeration() {
        let mut state = StoreState::new();
        let mut batch = WriteBatch::new();
        batch.put(SubjectRef::user("b"), Revision::NONE, Some(data_with("x")));
        batch.put(SubjectRef::user("a"), Revision::NONE, Some(data_with("x")));
        batch.put(SubjectRef::group("g"), Revision::NONE, Some(data_with("x")));
        state.apply(batch);

        assert_eq!(
            state.subjects_of_type("user"),
            vec![SubjectRef::user("a"), SubjectRef::user("b")]
        );
        assert_eq!(state.subject_types(), vec!["group".to_string(), "user".to_string()]);
    }
}
