//! Inheritance graph
//!
//! The graph is never stored on its own: it is the union of every subject's
//! parent list, read from the [`DataStore`] on demand. Cycles are allowed in
//! the data; traversal keeps a visited set so each subject is expanded once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use pexrs_engine::{DataStore, StoreResult};
use pexrs_sdk::{ContextSet, Revision, SubjectData, SubjectRef, Versioned};

use crate::registry::SubjectTypeRegistry;

/// One subject reached during a closure walk
#[derive(Debug, Clone)]
pub struct ClosureNode {
    pub subject: SubjectRef,
    /// Edges from the starting subject (0 for the subject itself)
    pub depth: usize,
    /// Position in breadth-first visiting order
    pub order: usize,
    pub revision: Revision,
    pub data: Arc<SubjectData>,
}

/// Every subject reachable from a starting subject, in BFS order
#[derive(Debug, Clone, Default)]
pub struct Closure {
    nodes: Vec<ClosureNode>,
}

impl Closure {
    pub fn nodes(&self) -> &[ClosureNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, subject: &SubjectRef) -> bool {
        self.nodes.iter().any(|n| &n.subject == subject)
    }

    /// Subjects in visiting order
    pub fn subjects(&self) -> impl Iterator<Item = &SubjectRef> {
        self.nodes.iter().map(|n| &n.subject)
    }

    /// (subject, revision) of every node, for cache validation
    pub fn contributors(&self) -> Vec<(SubjectRef, Revision)> {
        self.nodes
            .iter()
            .map(|n| (n.subject.clone(), n.revision))
            .collect()
    }
}

/// Read-only view of subject inheritance over a store
#[derive(Clone)]
pub struct PermissionGraph {
    store: Arc<dyn DataStore>,
    registry: Arc<SubjectTypeRegistry>,
    implicit_defaults: bool,
}

impl PermissionGraph {
    pub fn new(store: Arc<dyn DataStore>, registry: Arc<SubjectTypeRegistry>) -> Self {
        Self {
            store,
            registry,
            implicit_defaults: true,
        }
    }

    /// Whether closures fall back to `default:<type>` and `default:default`
    pub fn with_implicit_defaults(mut self, enabled: bool) -> Self {
        self.implicit_defaults = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubjectTypeRegistry> {
        &self.registry
    }

    /// Read a subject, substituting its type's default data if nothing is stored
    pub fn load(&self, subject: &SubjectRef) -> StoreResult<Versioned<Arc<SubjectData>>> {
        let mut data = self.store.get_data(subject)?;
        if data.value.is_empty() {
            if let Some(defaults) = self.registry.default_data(subject) {
                data.value = defaults;
            }
        }
        Ok(data)
    }

    /// Breadth-first closure of `subject` under `contexts`
    ///
    /// `contexts` should already be expanded through context inheritance.
    /// Parents are enqueued by descending edge weight, then insertion order.
    pub fn closure(&self, subject: &SubjectRef, contexts: &ContextSet) -> StoreResult<Closure> {
        let mut visited: HashSet<SubjectRef> = HashSet::new();
        let mut queue: VecDeque<(SubjectRef, usize)> = VecDeque::new();
        let mut nodes = Vec::new();

        visited.insert(subject.clone());
        queue.push_back((subject.clone(), 0));

        let mut fallbacks = if self.implicit_defaults {
            vec![
                SubjectRef::defaults_for(subject.subject_type()),
                SubjectRef::global_defaults(),
            ]
        } else {
            Vec::new()
        };
        fallbacks.reverse();

        loop {
            let Some((current, depth)) = queue.pop_front() else {
                // Explicit closure exhausted; continue from the next fallback
                match fallbacks.pop() {
                    Some(fallback) => {
                        if visited.insert(fallback.clone()) {
                            let depth = nodes.last().map_or(0, |n: &ClosureNode| n.depth + 1);
                            queue.push_back((fallback, depth));
                        }
                        continue;
                    }
                    None => break,
                }
            };

            let data = self.load(&current)?;
            for edge in data.value.parents_in(contexts) {
                if visited.insert(edge.parent.clone()) {
                    queue.push_back((edge.parent.clone(), depth + 1));
                }
            }

            tracing::trace!("Closure of {} visits {} at depth {}", subject, current, depth);
            nodes.push(ClosureNode {
                subject: current,
                depth,
                order: nodes.len(),
                revision: data.revision,
                data: data.value,
            });
        }

        Ok(Closure { nodes })
    }

    /// Parents of `subject` applicable under `contexts`, highest weight first
    pub fn direct_parents(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> StoreResult<Vec<SubjectRef>> {
        let data = self.load(subject)?;
        Ok(data
            .value
            .parents_in(contexts)
            .into_iter()
            .map(|e| e.parent.clone())
            .collect())
    }

    /// Every stored subject listing `parent` as a parent in any context
    pub fn children_of(&self, parent: &SubjectRef) -> StoreResult<Vec<SubjectRef>> {
        let mut children = Vec::new();
        for subject_type in self.store.subject_types()? {
            for subject in self.store.all_subjects(&subject_type)? {
                if self.store.get_data(&subject)?.value.has_parent(parent) {
                    children.push(subject);
                }
            }
        }
        Ok(children)
    }

    /// First stored subject found referencing `subject` as a parent
    pub fn referrer_of(&self, subject: &SubjectRef) -> StoreResult<Option<SubjectRef>> {
        for subject_type in self.store.subject_types()? {
            for candidate in self.store.all_subjects(&subject_type)? {
                if &candidate != subject
                    && self.store.get_data(&candidate)?.value.has_parent(subject)
                {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexrs_engine::MemoryStore;

    fn graph(store: &Arc<MemoryStore>) -> PermissionGraph {
        PermissionGraph::new(store.clone(), Arc::new(SubjectTypeRegistry::with_builtins()))
    }

    #[test]
    fn test_cycle_visits_each_once() {
        let store = Arc::new(MemoryStore::default());
        let global = ContextSet::empty();
        let (a, b, c) = (SubjectRef::group("a"), SubjectRef::group("b"), SubjectRef::group("c"));
        store.add_parent(&a, &global, &b, 0).unwrap();
        store.add_parent(&b, &global, &c, 0).unwrap();
        store.add_parent(&c, &global, &a, 0).unwrap();

        let closure = graph(&store)
            .with_implicit_defaults(false)
            .closure(&a, &global)
            .unwrap();
        let subjects: Vec<_> = closure.subjects().cloned().collect();
        assert_eq!(subjects, vec![a, b, c]);
    }

    #[test]
    fn test_parents_ordered_by_weight() {
        let store = Arc::new(MemoryStore::default());
        let global = ContextSet::empty();
        let alice = SubjectRef::user("alice");
        store.add_parent(&alice, &global, &SubjectRef::group("low"), 1).unwrap();
        store.add_parent(&alice, &global, &SubjectRef::group("high"), 10).unwrap();
        store.add_parent(&alice, &global, &SubjectRef::group("mid"), 1).unwrap();

        let closure = graph(&store)
            .with_implicit_defaults(false)
            .closure(&alice, &global)
            .unwrap();
        let ids: Vec<_> = closure.subjects().map(|s| s.identifier().to_string()).collect();
        assert_eq!(ids, vec!["alice", "high", "low", "mid"]);
        assert_eq!(closure.nodes()[1].depth, 1);
    }

    #[test]
    fn test_context_scoped_edges() {
        let store = Arc::new(MemoryStore::default());
        let alice = SubjectRef::user("alice");
        let nether = ContextSet::of([("world", "nether")]);
        store
            .add_parent(&alice, &nether, &SubjectRef::group("miner"), 0)
            .unwrap();

        let graph = graph(&store).with_implicit_defaults(false);
        assert_eq!(graph.closure(&alice, &ContextSet::empty()).unwrap().len(), 1);
        assert_eq!(graph.closure(&alice, &nether).unwrap().len(), 2);
    }

    #[test]
    fn test_implicit_defaults_appended() {
        let store = Arc::new(MemoryStore::default());
        let alice = SubjectRef::user("alice");

        let closure = graph(&store).closure(&alice, &ContextSet::empty()).unwrap();
        let subjects: Vec<_> = closure.subjects().cloned().collect();
        assert_eq!(
            subjects,
            vec![
                alice,
                SubjectRef::defaults_for("user"),
                SubjectRef::global_defaults()
            ]
        );
        assert!(closure.nodes().iter().all(|n| n.revision == Revision::NONE));
    }

    #[test]
    fn test_referrers() {
        let store = Arc::new(MemoryStore::default());
        let global = ContextSet::empty();
        let admin = SubjectRef::group("admin");
        store
            .add_parent(&SubjectRef::user("alice"), &global, &admin, 0)
            .unwrap();

        let graph = graph(&store);
        assert_eq!(graph.children_of(&admin).unwrap(), vec![SubjectRef::user("alice")]);
        assert_eq!(
            graph.referrer_of(&admin).unwrap(),
            Some(SubjectRef::user("alice"))
        );
        assert_eq!(graph.referrer_of(&SubjectRef::user("alice")).unwrap(), None);
    }
}
