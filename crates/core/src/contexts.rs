//! Context inheritance
//!
//! A context value may inherit others: with `world=nether` inheriting
//! `world=overworld`, a query made in the nether also satisfies entries
//! scoped to the overworld.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;

use pexrs_sdk::{ContextSet, ContextValue};

/// Child context value → inherited values
#[derive(Default)]
pub struct ContextInheritance {
    parents: RwLock<HashMap<ContextValue, Vec<ContextValue>>>,
}

impl ContextInheritance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the values `child` inherits; an empty list removes the mapping
    pub fn set_parents(&self, child: ContextValue, parents: Vec<ContextValue>) {
        let mut map = self.parents.write();
        if parents.is_empty() {
            map.remove(&child);
        } else {
            tracing::debug!("Context {} inherits {} value(s)", child, parents.len());
            map.insert(child, parents);
        }
    }

    pub fn parents_of(&self, child: &ContextValue) -> Vec<ContextValue> {
        self.parents.read().get(child).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.read().is_empty()
    }

    pub fn clear(&self) {
        self.parents.write().clear();
    }

    /// Add every transitively inherited value to `query`
    pub fn expand(&self, query: &ContextSet) -> ContextSet {
        let map = self.parents.read();
        if map.is_empty() || query.is_empty() {
            return query.clone();
        }

        let mut seen: HashSet<&ContextValue> = query.iter().collect();
        let mut queue: VecDeque<&ContextValue> = query.iter().collect();
        let mut expanded = Vec::new();

        while let Some(value) = queue.pop_front() {
            for parent in map.get(value).into_iter().flatten() {
                if seen.insert(parent) {
                    expanded.push(parent.clone());
                    queue.push_back(parent);
                }
            }
        }

        if expanded.is_empty() {
            return query.clone();
        }
        query.iter().cloned().chain(expanded).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(k: &str, v: &str) -> ContextValue {
        ContextValue::new(k, v)
    }

    #[test]
    fn test_expand_transitive() {
        let inheritance = ContextInheritance::new();
        inheritance.set_parents(value("world", "nether"), vec![value("world", "overworld")]);
        inheritance.set_parents(value("world", "overworld"), vec![value("server", "lobby")]);

        let expanded = inheritance.expand(&ContextSet::of([("world", "nether")]));
        assert_eq!(
            expanded,
            ContextSet::of([
                ("world", "nether"),
                ("world", "overworld"),
                ("server", "lobby")
            ])
        );
    }

    #[test]
    fn test_expand_cycle_terminates() {
        let inheritance = ContextInheritance::new();
        inheritance.set_parents(value("a", "1"), vec![value("b", "1")]);
        inheritance.set_parents(value("b", "1"), vec![value("a", "1")]);

        let expanded = inheritance.expand(&ContextSet::of([("a", "1")]));
        assert_eq!(expanded.len(), 2);
    }

    #[test]
    fn test_unrelated_query_unchanged() {
        let inheritance = ContextInheritance::new();
        inheritance.set_parents(value("world", "nether"), vec![value("world", "overworld")]);

        let query = ContextSet::of([("world", "end")]);
        assert_eq!(inheritance.expand(&query), query);

        inheritance.set_parents(value("world", "nether"), Vec::new());
        assert!(inheritance.is_empty());
    }
}
