//! The data store contract
//!
//! Backends implement the handful of required methods (read, revision,
//! atomic batch commit, enumeration); the single-record setters are provided
//! on top of them as read-modify-write cycles guarded by compare-and-set.

use std::sync::Arc;

use pexrs_sdk::node::{validate_option_key, validate_permission};
use pexrs_sdk::{ContextSet, Mutation, Revision, SubjectData, SubjectRef, Versioned};

use crate::error::{StoreError, StoreResult};
use crate::notify::{ChangeEvent, ChangeListener, ChangeNotifier, ListenerKey};

/// How many times a single-record setter re-reads after losing a race
const MAX_WRITE_RETRIES: usize = 3;

/// Lazy sequence of subjects returned by enumeration
pub type SubjectIter<'a> = Box<dyn Iterator<Item = SubjectRef> + Send + 'a>;

/// One record in a batch: the revision the writer read, and the new data
/// (`None` deletes the record)
#[derive(Debug, Clone)]
pub struct RecordWrite {
    pub subject: SubjectRef,
    pub expected: Revision,
    pub data: Option<SubjectData>,
}

/// A set of record writes applied all-or-nothing
///
/// Subjects the writer only read can be pinned with [`expect`](Self::expect);
/// the commit then also fails if any of them moved.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<RecordWrite>,
    reads: Vec<(SubjectRef, Revision)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write; a second write for the same subject replaces the first
    pub fn put(&mut self, subject: SubjectRef, expected: Revision, data: Option<SubjectData>) {
        let write = RecordWrite {
            subject,
            expected,
            data,
        };
        match self.writes.iter_mut().find(|w| w.subject == write.subject) {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
    }

    /// Require `subject` to still be at `revision` without writing it
    pub fn expect(&mut self, subject: SubjectRef, revision: Revision) {
        match self.reads.iter_mut().find(|(s, _)| *s == subject) {
            Some(existing) => existing.1 = revision,
            None => self.reads.push((subject, revision)),
        }
    }

    pub fn writes(&self) -> &[RecordWrite] {
        &self.writes
    }

    pub fn reads(&self) -> &[(SubjectRef, Revision)] {
        &self.reads
    }

    pub fn into_writes(self) -> Vec<RecordWrite> {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Reject malformed permission patterns and option keys before they are stored
pub fn validate_mutation(mutation: &Mutation) -> StoreResult<()> {
    let result = match mutation {
        Mutation::SetPermission { permission, .. } => {
            validate_permission(permission).map_err(|reason| (permission, reason))
        }
        Mutation::SetOption { key, .. } => {
            validate_option_key(key).map_err(|reason| (key, reason))
        }
        _ => Ok(()),
    };

    result.map_err(|(pattern, reason)| StoreError::InvalidPattern {
        pattern: pattern.clone(),
        reason,
    })
}

/// Rebuild whole-record data entry by entry, validating and normalizing it
/// the same way single mutations are
///
/// Used for data that arrives outside the mutation path (snapshot imports).
pub fn sanitize_data(data: &SubjectData) -> StoreResult<SubjectData> {
    let entries = data.permissions.len() + data.options.len() + data.parents.len();
    let mut mutations = Vec::with_capacity(entries + 1);
    mutations.extend(data.permissions.iter().map(|e| Mutation::SetPermission {
        permission: e.permission.clone(),
        value: Some(e.value),
        weight: e.weight,
        contexts: e.contexts.clone(),
    }));
    mutations.extend(data.options.iter().map(|e| Mutation::SetOption {
        key: e.key.clone(),
        value: Some(e.value.clone()),
        weight: e.weight,
        contexts: e.contexts.clone(),
    }));
    mutations.extend(data.parents.iter().map(|e| Mutation::AddParent {
        parent: e.parent.clone(),
        weight: e.weight,
        contexts: e.contexts.clone(),
    }));
    mutations.push(Mutation::SetRank(data.rank));

    let mut clean = SubjectData::new();
    for mutation in &mutations {
        validate_mutation(mutation)?;
        clean.apply(mutation);
    }
    Ok(clean)
}

/// Pluggable persistence backend for subject data
pub trait DataStore: Send + Sync {
    /// Backend name used in logs and errors
    fn name(&self) -> &str;

    /// Read a subject's data
    ///
    /// Subjects that were never written (or were deleted) yield empty data at
    /// their last known revision.
    fn get_data(&self, subject: &SubjectRef) -> StoreResult<Versioned<Arc<SubjectData>>>;

    /// Current revision of a subject without cloning its data
    fn revision(&self, subject: &SubjectRef) -> StoreResult<Revision>;

    /// Apply a batch atomically without notifying subscribers
    ///
    /// Fails with [`StoreError::StaleWrite`] if any record's current revision
    /// differs from the one in the batch; nothing is written in that case.
    fn commit(&self, batch: WriteBatch) -> StoreResult<Vec<ChangeEvent>>;

    /// Every stored subject of the given type
    fn all_subjects(&self, subject_type: &str) -> StoreResult<SubjectIter<'_>>;

    /// Every subject type with at least one stored subject
    fn subject_types(&self) -> StoreResult<Vec<String>>;

    /// Listener registry for this store
    fn notifier(&self) -> &ChangeNotifier;

    /// Pick up changes made outside this process and notify subscribers
    ///
    /// Backends without an external source have nothing to reload.
    fn reload(&self) -> StoreResult<Vec<ChangeEvent>> {
        Ok(Vec::new())
    }

    /// Commit a batch and notify subscribers
    fn apply(&self, batch: WriteBatch) -> StoreResult<Vec<ChangeEvent>> {
        let events = self.commit(batch)?;
        self.notifier().notify(&events);
        Ok(events)
    }

    /// Replace a subject's data if its revision is still `expected`
    fn compare_and_set(
        &self,
        subject: &SubjectRef,
        expected: Revision,
        data: SubjectData,
    ) -> StoreResult<Revision> {
        let mut batch = WriteBatch::new();
        batch.put(subject.clone(), expected, Some(data));
        let events = self.apply(batch)?;
        Ok(events.first().map(|e| e.revision).unwrap_or(expected))
    }

    /// Read-modify-write a single record
    ///
    /// Retries a few times if a concurrent writer wins the race, then gives
    /// up with [`StoreError::StaleWrite`]. A mutation that changes nothing
    /// does not advance the revision.
    fn update(&self, subject: &SubjectRef, mutation: &Mutation) -> StoreResult<Revision> {
        validate_mutation(mutation)?;

        let mut attempt = 0;
        loop {
            let current = self.get_data(subject)?;
            let mut data = (*current.value).clone();
            if !data.apply(mutation) {
                return Ok(current.revision);
            }

            match self.compare_and_set(subject, current.revision, data) {
                Err(err @ StoreError::StaleWrite { .. }) => {
                    attempt += 1;
                    if attempt >= MAX_WRITE_RETRIES {
                        return Err(err);
                    }
                    tracing::debug!("Retrying write to {} after conflict", subject);
                }
                other => return other,
            }
        }
    }

    fn set_permission(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: Option<bool>,
        weight: i32,
    ) -> StoreResult<Revision> {
        self.update(
            subject,
            &Mutation::SetPermission {
                permission: permission.to_string(),
                value,
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    fn set_option(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        key: &str,
        value: Option<&str>,
        weight: i32,
    ) -> StoreResult<Revision> {
        self.update(
            subject,
            &Mutation::SetOption {
                key: key.to_string(),
                value: value.map(str::to_string),
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    fn add_parent(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parent: &SubjectRef,
        weight: i32,
    ) -> StoreResult<Revision> {
        self.update(
            subject,
            &Mutation::AddParent {
                parent: parent.clone(),
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    fn remove_parent(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parent: &SubjectRef,
    ) -> StoreResult<Revision> {
        self.update(
            subject,
            &Mutation::RemoveParent {
                parent: parent.clone(),
                contexts: contexts.clone(),
            },
        )
    }

    fn set_rank(&self, subject: &SubjectRef, rank: Option<i32>) -> StoreResult<Revision> {
        self.update(subject, &Mutation::SetRank(rank))
    }

    fn subscribe(&self, listener: ChangeListener) -> ListenerKey {
        self.notifier().subscribe(listener)
    }

    fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.notifier().unsubscribe(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_put_replaces_same_subject() {
        let mut batch = WriteBatch::new();
        let alice = SubjectRef::user("alice");

        batch.put(alice.clone(), Revision(1), None);
        batch.put(SubjectRef::user("bob"), Revision::NONE, Some(SubjectData::new()));
        batch.put(alice.clone(), Revision(2), Some(SubjectData::new()));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.writes()[0].expected, Revision(2));
        assert!(batch.writes()[0].data.is_some());

        batch.expect(SubjectRef::group("admin"), Revision(4));
        batch.expect(SubjectRef::group("admin"), Revision(5));
        assert_eq!(batch.reads(), &[(SubjectRef::group("admin"), Revision(5))]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_sanitize_data() {
        let mut data = SubjectData::new();
        data.permissions.push(pexrs_sdk::PermissionEntry {
            permission: "Chat.Color".into(),
            value: true,
            weight: 2,
            contexts: ContextSet::empty(),
        });
        data.rank = Some(7);

        let clean = sanitize_data(&data).unwrap();
        assert_eq!(clean.permissions[0].permission, "chat.color");
        assert_eq!(clean.permissions[0].weight, 2);
        assert_eq!(clean.rank, Some(7));

        data.permissions[0].permission = "chat.*.color".into();
        assert!(matches!(
            sanitize_data(&data),
            Err(StoreError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_validate_mutation() {
        let bad = Mutation::SetPermission {
            permission: "files..delete".into(),
            value: Some(true),
            weight: 0,
            contexts: ContextSet::empty(),
        };
        assert!(matches!(
            validate_mutation(&bad),
            Err(StoreError::InvalidPattern { .. })
        ));

        let bad_key = Mutation::SetOption {
            key: "chat prefix".into(),
            value: Some("x".into()),
            weight: 0,
            contexts: ContextSet::empty(),
        };
        assert!(validate_mutation(&bad_key).is_err());

        assert!(validate_mutation(&Mutation::SetRank(Some(1))).is_ok());
    }
}
