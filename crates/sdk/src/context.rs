//! Context sets
//!
//! A context is a `key=value` condition such as `world=nether` or
//! `server=lobby`. Rules stored with a [`ContextSet`] only apply when a query
//! carries at least those contexts: the stored set must be a subset of the
//! query set. The empty set applies everywhere.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single `key=value` scoping condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextValue {
    pub key: String,
    pub value: String,
}

impl ContextValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse `key=value`
    pub fn parse(input: &str) -> Option<Self> {
        let (key, value) = input.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(key, value))
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Immutable set of contexts
///
/// Backed by a `BTreeSet` so that equal sets hash and compare equally
/// regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSet(BTreeSet<ContextValue>);

impl ContextSet {
    /// The empty (global) context set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from `(key, value)` pairs
    pub fn of<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| ContextValue::new(k, v))
            .collect()
    }

    /// Return a copy with one more context
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut set = self.0.clone();
        set.insert(ContextValue::new(key, value));
        Self(set)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextValue> {
        self.0.iter()
    }

    pub fn contains(&self, value: &ContextValue) -> bool {
        self.0.contains(value)
    }

    /// Values stored under a key
    pub fn values_of<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |c| c.key == key)
            .map(|c| c.value.as_str())
    }

    pub fn is_subset_of(&self, other: &ContextSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Whether a rule stored under `self` applies to a query made with `query`
    pub fn applies_to(&self, query: &ContextSet) -> bool {
        self.is_subset_of(query)
    }

    pub fn union(&self, other: &ContextSet) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }
}

impl FromIterator<ContextValue> for ContextSet {
    fn from_iter<I: IntoIterator<Item = ContextValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ContextSet {
    type Item = &'a ContextValue;
    type IntoIter = std::collections::btree_set::Iter<'a, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, context) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", context)?;
        }
        f.write_str("}")
    }
}
