//! Rank ladders
//!
//! A ladder is an ordered list of groups, lowest first. Promoting a subject
//! moves it one step up the ladder by swapping its parent edge; demoting moves
//! it one step down, or off the ladder entirely from the bottom rank.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use pexrs_sdk::{ContextSet, SubjectData, SubjectRef};

use crate::transactions::{TransactionError, TransactionManager};

/// Named, ordered list of rank groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    name: String,
    ranks: Vec<SubjectRef>,
}

impl Ladder {
    pub fn new(name: impl Into<String>, ranks: Vec<SubjectRef>) -> Self {
        Self {
            name: name.into(),
            ranks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ranks(&self) -> &[SubjectRef] {
        &self.ranks
    }

    pub fn position(&self, rank: &SubjectRef) -> Option<usize> {
        self.ranks.iter().position(|r| r == rank)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Highest ladder rank among the subject's parents in exactly `contexts`
    fn current(&self, data: &SubjectData, contexts: &ContextSet) -> Option<(usize, i32)> {
        data.parents
            .iter()
            .filter(|e| &e.contexts == contexts)
            .filter_map(|e| self.position(&e.parent).map(|pos| (pos, e.weight)))
            .max_by_key(|(pos, _)| *pos)
    }
}

/// Outcome of a promotion or demotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderChange {
    pub ladder: String,
    pub subject: SubjectRef,
    pub from: Option<SubjectRef>,
    pub to: Option<SubjectRef>,
}

impl LadderChange {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Move `subject` one rank up `ladder`
pub fn promote(
    manager: &TransactionManager,
    ladder: &Ladder,
    subject: &SubjectRef,
    contexts: &ContextSet,
) -> Result<LadderChange, TransactionError> {
    let mut tx = manager.begin();
    let data = tx.data(subject)?;

    let (from, to) = match ladder.current(&data, contexts) {
        None => match ladder.ranks.first() {
            Some(first) => {
                tx.add_parent(subject, contexts, first, 0)?;
                (None, Some(first.clone()))
            }
            None => (None, None),
        },
        Some((pos, weight)) => {
            let from = ladder.ranks[pos].clone();
            match ladder.ranks.get(pos + 1) {
                Some(next) => {
                    tx.remove_parent(subject, contexts, &from)?;
                    tx.add_parent(subject, contexts, next, weight)?;
                    (Some(from), Some(next.clone()))
                }
                None => (Some(from.clone()), Some(from)),
            }
        }
    };

    tx.commit()?;
    tracing::info!(
        "Promoted {} on ladder '{}': {:?} -> {:?}",
        subject,
        ladder.name,
        from,
        to
    );
    Ok(LadderChange {
        ladder: ladder.name.clone(),
        subject: subject.clone(),
        from,
        to,
    })
}

/// Move `subject` one rank down `ladder`
pub fn demote(
    manager: &TransactionManager,
    ladder: &Ladder,
    subject: &SubjectRef,
    contexts: &ContextSet,
) -> Result<LadderChange, TransactionError> {
    let mut tx = manager.begin();
    let data = tx.data(subject)?;

    let (from, to) = match ladder.current(&data, contexts) {
        None => (None, None),
        Some((pos, weight)) => {
            let from = ladder.ranks[pos].clone();
            tx.remove_parent(subject, contexts, &from)?;
            let to = match pos.checked_sub(1).map(|p| &ladder.ranks[p]) {
                Some(previous) => {
                    tx.add_parent(subject, contexts, previous, weight)?;
                    Some(previous.clone())
                }
                None => None,
            };
            (Some(from), to)
        }
    };

    tx.commit()?;
    tracing::info!(
        "Demoted {} on ladder '{}': {:?} -> {:?}",
        subject,
        ladder.name,
        from,
        to
    );
    Ok(LadderChange {
        ladder: ladder.name.clone(),
        subject: subject.clone(),
        from,
        to,
    })
}

/// Ladders by name
#[derive(Default)]
pub struct RankLadders {
    ladders: RwLock<BTreeMap<String, Ladder>>,
}

impl RankLadders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ladder: Ladder) -> Option<Ladder> {
        tracing::debug!("Ladder '{}' has {} rank(s)", ladder.name, ladder.len());
        self.ladders.write().insert(ladder.name.clone(), ladder)
    }

    pub fn remove(&self, name: &str) -> Option<Ladder> {
        self.ladders.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Ladder> {
        self.ladders.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.ladders.read().keys().cloned().collect()
    }
}
