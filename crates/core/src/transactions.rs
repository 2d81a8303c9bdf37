//! Transactions
//!
//! A [`Transaction`] stages changes to any number of subjects and applies
//! them with one store commit. The first time a transaction touches a subject
//! it records the subject's revision; commit fails with
//! [`TransactionError::Conflict`] if any of them moved in the meantime.
//!
//! All commits pass through one [`CommitGate`]. Commits hold it exclusively
//! and resolvers hold it shared, so a resolution never observes half of a
//! transaction.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = manager.begin();
//! tx.add_parent(&alice, &ContextSet::empty(), &admin, 0)?;
//! tx.set_permission(&admin, &ContextSet::empty(), "files.*", Some(true), 0)?;
//! tx.commit()?;
//! ```

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use pexrs_engine::{validate_mutation, ChangeEvent, DataStore, StoreError, StoreResult, WriteBatch};
use pexrs_sdk::{ContextSet, Mutation, Revision, SubjectData, SubjectRef};

use crate::cache::ResolutionCache;
use crate::registry::SubjectTypeRegistry;

/// Transaction errors
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Another commit changed a subject this transaction read
    #[error("Conflict on {subject}: read at {expected}, now at {actual}")]
    Conflict {
        subject: SubjectRef,
        expected: Revision,
        actual: Revision,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransactionError {
    /// Conflicts succeed on retry with fresh data
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::StaleWrite {
                subject,
                expected,
                actual,
            } => Self::Conflict {
                subject,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

/// Serializes commits against resolutions
#[derive(Default)]
pub struct CommitGate {
    lock: RwLock<()>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held by a resolver for the duration of one resolution
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    /// Held by a commit from revision check to cache invalidation
    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Subjects written, with their new revisions
    pub changes: Vec<ChangeEvent>,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Revision of `subject` after the commit, if it was written
    pub fn revision_of(&self, subject: &SubjectRef) -> Option<Revision> {
        self.changes
            .iter()
            .find(|e| &e.subject == subject)
            .map(|e| e.revision)
    }
}

/// Entry point for all writes
pub struct TransactionManager {
    store: Arc<dyn DataStore>,
    cache: Arc<ResolutionCache>,
    registry: Arc<SubjectTypeRegistry>,
    gate: Arc<CommitGate>,
}

impl TransactionManager {
    pub fn new(
        store: Arc<dyn DataStore>,
        cache: Arc<ResolutionCache>,
        registry: Arc<SubjectTypeRegistry>,
        gate: Arc<CommitGate>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            gate,
        }
    }

    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            manager: self,
            touched: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Commit a prepared batch under the gate, invalidate, then notify
    ///
    /// Subscribers are notified after the gate is released so that a listener
    /// may resolve or commit without deadlocking.
    pub fn commit_batch(&self, batch: WriteBatch) -> StoreResult<Vec<ChangeEvent>> {
        let events = {
            let _gate = self.gate.write();
            let events = self.store.commit(batch)?;
            for event in &events {
                self.cache.invalidate(&event.subject);
            }
            events
        };

        self.store.notifier().notify(&events);
        Ok(events)
    }
}

struct Pending {
    expected: Revision,
    data: SubjectData,
    changed: bool,
}

/// Staged changes; dropped without commit means rolled back
pub struct Transaction<'a> {
    manager: &'a TransactionManager,
    touched: BTreeMap<SubjectRef, Pending>,
}

impl<'a> Transaction<'a> {
    fn touch(&mut self, subject: &SubjectRef) -> StoreResult<&mut Pending> {
        match self.touched.entry(subject.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let current = self.manager.store.get_data(subject)?;
                Ok(entry.insert(Pending {
                    expected: current.revision,
                    data: (*current.value).clone(),
                    changed: false,
                }))
            }
        }
    }

    /// Stage a mutation. Returns whether it changed the staged data.
    pub fn apply(&mut self, subject: &SubjectRef, mutation: &Mutation) -> StoreResult<bool> {
        validate_mutation(mutation)?;
        self.manager.registry.validate(subject)?;
        if let Mutation::AddParent { parent, .. } = mutation {
            self.manager.registry.validate(parent)?;
        }

        let pending = self.touch(subject)?;
        let changed = pending.data.apply(mutation);
        pending.changed |= changed;
        Ok(changed)
    }

    pub fn set_permission(
        &mut self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        permission: &str,
        value: Option<bool>,
        weight: i32,
    ) -> StoreResult<bool> {
        self.apply(
            subject,
            &Mutation::SetPermission {
                permission: permission.to_string(),
                value,
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    pub fn set_option(
        &mut self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        key: &str,
        value: Option<&str>,
        weight: i32,
    ) -> StoreResult<bool> {
        self.apply(
            subject,
            &Mutation::SetOption {
                key: key.to_string(),
                value: value.map(str::to_string),
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    pub fn add_parent(
        &mut self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parent: &SubjectRef,
        weight: i32,
    ) -> StoreResult<bool> {
        self.apply(
            subject,
            &Mutation::AddParent {
                parent: parent.clone(),
                weight,
                contexts: contexts.clone(),
            },
        )
    }

    pub fn remove_parent(
        &mut self,
        subject: &SubjectRef,
        contexts: &ContextSet,
        parent: &SubjectRef,
    ) -> StoreResult<bool> {
        self.apply(
            subject,
            &Mutation::RemoveParent {
                parent: parent.clone(),
                contexts: contexts.clone(),
            },
        )
    }

    pub fn set_rank(&mut self, subject: &SubjectRef, rank: Option<i32>) -> StoreResult<bool> {
        self.apply(subject, &Mutation::SetRank(rank))
    }

    /// Remove all of a subject's data
    pub fn clear(&mut self, subject: &SubjectRef) -> StoreResult<bool> {
        self.apply(subject, &Mutation::Clear)
    }

    /// A subject's data with this transaction's changes applied
    ///
    /// Reading a subject records its revision like any other touch.
    pub fn data(&mut self, subject: &SubjectRef) -> StoreResult<SubjectData> {
        Ok(self.touch(subject)?.data.clone())
    }

    /// Number of subjects with staged changes
    pub fn pending(&self) -> usize {
        self.touched.values().filter(|p| p.changed).count()
    }

    /// Apply every staged change atomically
    pub fn commit(self) -> Result<CommitSummary, TransactionError> {
        self.commit_checked(|| Ok(()))
    }

    /// Commit after `check` passes, with the commit gate held across both
    ///
    /// No other transaction can commit between the check and the write, so
    /// `check` sees exactly the state this commit applies to.
    pub fn commit_checked<F>(mut self, check: F) -> Result<CommitSummary, TransactionError>
    where
        F: FnOnce() -> StoreResult<()>,
    {
        let touched = std::mem::take(&mut self.touched);
        let manager = self.manager;

        // Subjects only read are pinned so the store rejects the batch if they moved
        let mut batch = WriteBatch::new();
        for (subject, pending) in touched {
            if pending.changed {
                let data = (!pending.data.is_empty()).then_some(pending.data);
                batch.put(subject, pending.expected, data);
            } else {
                batch.expect(subject, pending.expected);
            }
        }

        if batch.is_empty() {
            tracing::trace!("Nothing to commit");
            return Ok(CommitSummary::default());
        }

        let events = {
            let _gate = manager.gate.write();
            check()?;

            let events = manager.store.commit(batch).map_err(|err| {
                if err.is_retryable() {
                    tracing::warn!("Transaction conflict: {}", err);
                }
                TransactionError::from_store(err)
            })?;
            for event in &events {
                manager.cache.invalidate(&event.subject);
            }
            events
        };

        manager.store.notifier().notify(&events);
        tracing::debug!("Committed transaction touching {} subject(s)", events.len());
        Ok(CommitSummary { changes: events })
    }

    /// Discard every staged change
    pub fn rollback(mut self) {
        let discarded = self.pending();
        self.touched.clear();
        tracing::debug!("Rolled back transaction ({} staged subject(s))", discarded);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let discarded = self.pending();
        if discarded > 0 {
            tracing::debug!(
                "Transaction dropped without commit, discarding {} subject(s)",
                discarded
            );
        }
    }
}
