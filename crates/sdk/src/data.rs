//! Per-subject data records
//!
//! A [`SubjectData`] holds everything stored for one subject: permission
//! entries, options, weighted parent edges and an optional rank. Entries are
//! kept in insertion order; that order is the final tie-break during
//! resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ContextSet;
use crate::node::normalize;
use crate::subject::SubjectRef;

/// Monotonic record version
///
/// `Revision::NONE` means the subject has never been written.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub const NONE: Revision = Revision(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A value tagged with the revision it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(revision: Revision, value: T) -> Self {
        Self { revision, value }
    }
}

/// Outcome of a permission resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tristate {
    /// Granted
    True,
    /// Denied
    False,
    /// No matching rule anywhere
    #[default]
    Undefined,
}

impl Tristate {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::Undefined => None,
        }
    }

    /// Collapse to a boolean, using `default` for `Undefined`
    pub fn as_bool_or(self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }

    pub fn is_defined(self) -> bool {
        self != Self::Undefined
    }
}

/// A stored permission rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub permission: String,
    pub value: bool,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub contexts: ContextSet,
}

/// A stored option (string metadata such as `prefix` or `suffix`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub contexts: ContextSet,
}

/// A weighted, context-scoped inheritance edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEntry {
    pub parent: SubjectRef,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub contexts: ContextSet,
}

/// A single change to a subject's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set (`Some`) or unset (`None`) a permission in a context set
    SetPermission {
        permission: String,
        value: Option<bool>,
        weight: i32,
        contexts: ContextSet,
    },
    /// Set (`Some`) or unset (`None`) an option in a context set
    SetOption {
        key: String,
        value: Option<String>,
        weight: i32,
        contexts: ContextSet,
    },
    /// Add a parent, or update its weight if already present
    AddParent {
        parent: SubjectRef,
        weight: i32,
        contexts: ContextSet,
    },
    /// Remove a parent edge
    RemoveParent {
        parent: SubjectRef,
        contexts: ContextSet,
    },
    /// Set or clear the rank
    SetRank(Option<i32>),
    /// Remove every entry
    Clear,
}

/// Raw data stored for one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectData {
    pub permissions: Vec<PermissionEntry>,
    pub options: Vec<OptionEntry>,
    pub parents: Vec<ParentEntry>,
    pub rank: Option<i32>,
}

impl SubjectData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.options.is_empty()
            && self.parents.is_empty()
            && self.rank.is_none()
    }

    /// Set or unset a permission. Returns whether anything changed.
    pub fn set_permission(
        &mut self,
        contexts: &ContextSet,
        permission: &str,
        value: Option<bool>,
        weight: i32,
    ) -> bool {
        let permission = normalize(permission);
        let existing = self
            .permissions
            .iter()
            .position(|e| e.permission == permission && &e.contexts == contexts);

        match (existing, value) {
            (Some(i), Some(value)) => {
                let entry = &mut self.permissions[i];
                let changed = entry.value != value || entry.weight != weight;
                entry.value = value;
                entry.weight = weight;
                changed
            }
            (Some(i), None) => {
                self.permissions.remove(i);
                true
            }
            (None, Some(value)) => {
                self.permissions.push(PermissionEntry {
                    permission,
                    value,
                    weight,
                    contexts: contexts.clone(),
                });
                true
            }
            (None, None) => false,
        }
    }

    /// Set or unset an option. Returns whether anything changed.
    pub fn set_option(
        &mut self,
        contexts: &ContextSet,
        key: &str,
        value: Option<&str>,
        weight: i32,
    ) -> bool {
        let key = normalize(key);
        let existing = self
            .options
            .iter()
            .position(|e| e.key == key && &e.contexts == contexts);

        match (existing, value) {
            (Some(i), Some(value)) => {
                let entry = &mut self.options[i];
                let changed = entry.value != value || entry.weight != weight;
                entry.value = value.to_string();
                entry.weight = weight;
                changed
            }
            (Some(i), None) => {
                self.options.remove(i);
                true
            }
            (None, Some(value)) => {
                self.options.push(OptionEntry {
                    key,
                    value: value.to_string(),
                    weight,
                    contexts: contexts.clone(),
                });
                true
            }
            (None, None) => false,
        }
    }

    /// Add a parent edge, or update its weight. Returns whether anything changed.
    pub fn add_parent(&mut self, contexts: &ContextSet, parent: &SubjectRef, weight: i32) -> bool {
        match self
            .parents
            .iter_mut()
            .find(|e| &e.parent == parent && &e.contexts == contexts)
        {
            Some(entry) => {
                let changed = entry.weight != weight;
                entry.weight = weight;
                changed
            }
            None => {
                self.parents.push(ParentEntry {
                    parent: parent.clone(),
                    weight,
                    contexts: contexts.clone(),
                });
                true
            }
        }
    }

    /// Remove a parent edge. Returns whether it existed.
    pub fn remove_parent(&mut self, contexts: &ContextSet, parent: &SubjectRef) -> bool {
        let before = self.parents.len();
        self.parents
            .retain(|e| !(&e.parent == parent && &e.contexts == contexts));
        self.parents.len() != before
    }

    pub fn set_rank(&mut self, rank: Option<i32>) -> bool {
        let changed = self.rank != rank;
        self.rank = rank;
        changed
    }

    /// Apply a mutation. Returns whether anything changed.
    pub fn apply(&mut self, mutation: &Mutation) -> bool {
        match mutation {
            Mutation::SetPermission {
                permission,
                value,
                weight,
                contexts,
            } => self.set_permission(contexts, permission, *value, *weight),
            Mutation::SetOption {
                key,
                value,
                weight,
                contexts,
            } => self.set_option(contexts, key, value.as_deref(), *weight),
            Mutation::AddParent {
                parent,
                weight,
                contexts,
            } => self.add_parent(contexts, parent, *weight),
            Mutation::RemoveParent { parent, contexts } => self.remove_parent(contexts, parent),
            Mutation::SetRank(rank) => self.set_rank(*rank),
            Mutation::Clear => {
                let changed = !self.is_empty();
                *self = Self::default();
                changed
            }
        }
    }

    /// Parent edges applicable under `query`, by descending weight then
    /// insertion order
    pub fn parents_in(&self, query: &ContextSet) -> Vec<&ParentEntry> {
        let mut parents: Vec<&ParentEntry> = self
            .parents
            .iter()
            .filter(|e| e.contexts.applies_to(query))
            .collect();
        // sort_by is stable, so equal weights keep insertion order
        parents.sort_by(|a, b| b.weight.cmp(&a.weight));
        parents
    }

    /// Whether `parent` appears anywhere in the parent list
    pub fn has_parent(&self, parent: &SubjectRef) -> bool {
        self.parents.iter().any(|e| &e.parent == parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_permission_replaces_in_place() {
        let mut data = SubjectData::new();
        let global = ContextSet::empty();

        assert!(data.set_permission(&global, "a.b", Some(true), 1));
        assert!(data.set_permission(&global, "c.d", Some(true), 1));
        assert!(data.set_permission(&global, "A.B", Some(false), 3));

        assert_eq!(data.permissions.len(), 2);
        assert_eq!(data.permissions[0].permission, "a.b");
        assert!(!data.permissions[0].value);
        assert_eq!(data.permissions[0].weight, 3);

        assert!(!data.set_permission(&global, "a.b", Some(false), 3));
    }

    #[test]
    fn test_set_permission_per_context() {
        let mut data = SubjectData::new();
        let nether = ContextSet::of([("world", "nether")]);

        data.set_permission(&ContextSet::empty(), "fly", Some(false), 0);
        data.set_permission(&nether, "fly", Some(true), 0);
        assert_eq!(data.permissions.len(), 2);

        assert!(data.set_permission(&nether, "fly", None, 0));
        assert_eq!(data.permissions.len(), 1);
        assert!(!data.set_permission(&nether, "fly", None, 0));
    }

    #[test]
    fn test_options() {
        let mut data = SubjectData::new();
        let global = ContextSet::empty();

        assert!(data.set_option(&global, "Prefix", Some("[Admin]"), 0));
        assert_eq!(data.options[0].key, "prefix");
        assert!(data.set_option(&global, "prefix", Some("[Mod]"), 0));
        assert_eq!(data.options.len(), 1);
        assert!(data.set_option(&global, "prefix", None, 0));
        assert!(data.options.is_empty());
    }

    #[test]
    fn test_parents_sorted_by_weight_then_insertion() {
        let mut data = SubjectData::new();
        let global = ContextSet::empty();
        let nether = ContextSet::of([("world", "nether")]);

        data.add_parent(&global, &SubjectRef::group("a"), 1);
        data.add_parent(&global, &SubjectRef::group("b"), 5);
        data.add_parent(&global, &SubjectRef::group("c"), 1);
        data.add_parent(&nether, &SubjectRef::group("d"), 10);

        let order: Vec<_> = data
            .parents_in(&global)
            .iter()
            .map(|e| e.parent.identifier().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);

        let nether_order: Vec<_> = data
            .parents_in(&nether)
            .iter()
            .map(|e| e.parent.identifier().to_string())
            .collect();
        assert_eq!(nether_order, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn test_remove_parent_and_clear() {
        let mut data = SubjectData::new();
        let global = ContextSet::empty();
        let admin = SubjectRef::group("admin");

        data.add_parent(&global, &admin, 0);
        assert!(data.has_parent(&admin));
        assert!(data.remove_parent(&global, &admin));
        assert!(!data.remove_parent(&global, &admin));

        data.set_rank(Some(10));
        assert!(data.apply(&Mutation::Clear));
        assert!(data.is_empty());
        assert!(!data.apply(&Mutation::Clear));
    }

    #[test]
    fn test_tristate() {
        assert_eq!(Tristate::from_bool(true), Tristate::True);
        assert_eq!(Tristate::Undefined.as_bool(), None);
        assert!(!Tristate::Undefined.as_bool_or(false));
        assert!(Tristate::False.is_defined());
    }

    #[test]
    fn test_serde_roundtrip_defaults() {
        let json = r#"{"permissions":[{"permission":"a","value":true}]}"#;
        let data: SubjectData = serde_json::from_str(json).unwrap();
        assert_eq!(data.permissions[0].weight, 0);
        assert!(data.permissions[0].contexts.is_empty());
        assert!(data.parents.is_empty());
    }
}
