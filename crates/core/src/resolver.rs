//! Permission, option and rank resolution
//!
//! A resolution walks the subject's closure (see [`PermissionGraph`]) and
//! picks a single winning entry across every visited subject. For
//! permissions the winner is ordered by:
//!
//! 1. exact match over any wildcard, whatever the weights
//! 2. higher entry weight
//! 3. longer wildcard prefix
//! 4. earlier subject in BFS order
//! 5. earlier entry within the subject
//!
//! Options use exact keys, then weight, BFS order and entry order. Rank is
//! taken from the first subject in BFS order that has one.

use std::cmp::Reverse;
use std::sync::Arc;

use pexrs_engine::{DataStore, StoreResult};
use pexrs_sdk::node::{match_node, normalize};
use pexrs_sdk::{ContextSet, SubjectRef, Tristate};

use crate::cache::{CacheKey, CachedValue, Contributors, Query, ResolutionCache};
use crate::contexts::ContextInheritance;
use crate::graph::{Closure, PermissionGraph};
use crate::transactions::CommitGate;

/// Cached, gate-aware resolver
pub struct Resolver {
    graph: PermissionGraph,
    cache: Arc<ResolutionCache>,
    contexts: Arc<ContextInheritance>,
    gate: Arc<CommitGate>,
    default_rank: i32,
}

impl Resolver {
    pub fn new(
        graph: PermissionGraph,
        cache: Arc<ResolutionCache>,
        contexts: Arc<ContextInheritance>,
        gate: Arc<CommitGate>,
    ) -> Self {
        Self {
            graph,
            cache,
            contexts,
            gate,
            default_rank: 0,
        }
    }

    /// Rank reported for subjects with no rank anywhere in their closure
    pub fn with_default_rank(mut self, rank: i32) -> Self {
        self.default_rank = rank;
        self
    }

    pub fn graph(&self) -> &PermissionGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Closure of `subject` under the inheritance-expanded `contexts`
    pub fn closure(&self, subject: &SubjectRef, contexts: &ContextSet) -> StoreResult<Closure> {
        let _gate = self.gate.read();
        self.graph.closure(subject, &self.contexts.expand(contexts))
    }

    pub fn resolve(
        &self,
        subject: &SubjectRef,
        permission: &str,
        contexts: &ContextSet,
    ) -> StoreResult<Tristate> {
        let node = normalize(permission);
        let key = CacheKey::new(subject, contexts, Query::Permission(node.clone()));

        let value = self.cached(key, || {
            let (closure, expanded) = self.walk(subject, contexts)?;
            let result = select_permission(&closure, &node, &expanded);
            Ok((CachedValue::Permission(result), closure.contributors()))
        })?;

        Ok(match value {
            CachedValue::Permission(result) => result,
            _ => Tristate::Undefined,
        })
    }

    pub fn resolve_option(
        &self,
        subject: &SubjectRef,
        key: &str,
        contexts: &ContextSet,
    ) -> StoreResult<Option<String>> {
        let option = normalize(key);
        let cache_key = CacheKey::new(subject, contexts, Query::Option(option.clone()));

        let value = self.cached(cache_key, || {
            let (closure, expanded) = self.walk(subject, contexts)?;
            let result = select_option(&closure, &option, &expanded);
            Ok((CachedValue::Option(result), closure.contributors()))
        })?;

        Ok(match value {
            CachedValue::Option(result) => result,
            _ => None,
        })
    }

    pub fn resolve_rank(&self, subject: &SubjectRef, contexts: &ContextSet) -> StoreResult<i32> {
        let key = CacheKey::new(subject, contexts, Query::Rank);

        let value = self.cached(key, || {
            let (closure, _) = self.walk(subject, contexts)?;
            let result = select_rank(&closure).unwrap_or(self.default_rank);
            Ok((CachedValue::Rank(result), closure.contributors()))
        })?;

        Ok(match value {
            CachedValue::Rank(rank) => rank,
            _ => self.default_rank,
        })
    }

    /// Serve from the cache, computing misses under the shared side of the
    /// commit gate
    ///
    /// Hits take no gate: revisions are never reused and each store commit is
    /// atomic, so an entry whose contributors all still match was computed
    /// from a state no later commit has touched.
    fn cached<C>(&self, key: CacheKey, compute: C) -> StoreResult<CachedValue>
    where
        C: FnOnce() -> StoreResult<(CachedValue, Contributors)>,
    {
        let store: &Arc<dyn DataStore> = self.graph.store();
        self.cache.get_or_compute(
            key,
            |subject| store.revision(subject),
            || {
                let _gate = self.gate.read();
                compute()
            },
        )
    }

    fn walk(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> StoreResult<(Closure, ContextSet)> {
        let expanded = self.contexts.expand(contexts);
        let closure = self.graph.closure(subject, &expanded)?;
        Ok((closure, expanded))
    }
}

/// Pick the winning permission entry across a closure
pub fn select_permission(closure: &Closure, node: &str, contexts: &ContextSet) -> Tristate {
    type Precedence = (bool, i32, usize, Reverse<usize>, Reverse<usize>);
    let mut best: Option<(Precedence, bool)> = None;

    for visited in closure.nodes() {
        for (index, entry) in visited.data.permissions.iter().enumerate() {
            if !entry.contexts.applies_to(contexts) {
                continue;
            }
            let Some(kind) = match_node(&entry.permission, node) else {
                continue;
            };

            let rank = (
                kind.is_exact(),
                entry.weight,
                kind.depth(),
                Reverse(visited.order),
                Reverse(index),
            );
            if best.as_ref().map_or(true, |(current, _)| rank > *current) {
                best = Some((rank, entry.value));
            }
        }
    }

    match best {
        Some((_, value)) => Tristate::from_bool(value),
        None => Tristate::Undefined,
    }
}

/// Pick the winning option value across a closure
pub fn select_option(closure: &Closure, key: &str, contexts: &ContextSet) -> Option<String> {
    let mut best: Option<((i32, Reverse<usize>, Reverse<usize>), &str)> = None;

    for visited in closure.nodes() {
        for (index, entry) in visited.data.options.iter().enumerate() {
            if entry.key != key || !entry.contexts.applies_to(contexts) {
                continue;
            }
            let rank = (entry.weight, Reverse(visited.order), Reverse(index));
            if best.as_ref().map_or(true, |(current, _)| rank > *current) {
                best = Some((rank, entry.value.as_str()));
            }
        }
    }

    best.map(|(_, value)| value.to_string())
}

/// Rank of the first subject in BFS order that has one
pub fn select_rank(closure: &Closure) -> Option<i32> {
    closure.nodes().iter().find_map(|n| n.data.rank)
}
