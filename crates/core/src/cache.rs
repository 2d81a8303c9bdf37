//! Resolution cache
//!
//! Memoizes resolver results keyed by (subject, contexts, query). Each entry
//! remembers the revision of every subject that contributed to it; a hit is
//! only served if all of those revisions are still current, so the cache never
//! needs to be told about a change in order to stay correct. Explicit
//! invalidation just frees the memory early.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use pexrs_engine::StoreResult;
use pexrs_sdk::{ContextSet, Revision, SubjectRef, Tristate};

/// What is being resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Permission(String),
    Option(String),
    Rank,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject: SubjectRef,
    pub contexts: ContextSet,
    pub query: Query,
}

impl CacheKey {
    pub fn new(subject: &SubjectRef, contexts: &ContextSet, query: Query) -> Self {
        Self {
            subject: subject.clone(),
            contexts: contexts.clone(),
            query,
        }
    }
}

/// A resolved value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Permission(Tristate),
    Option(Option<String>),
    Rank(i32),
}

/// Subjects (and their revisions) a value was computed from
pub type Contributors = Vec<(SubjectRef, Revision)>;

#[derive(Clone)]
struct CacheEntry {
    value: CachedValue,
    contributors: Arc<[(SubjectRef, Revision)]>,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// Size-bounded LRU of resolution results
pub struct ResolutionCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// Contributor → keys of entries it contributed to
    by_subject: DashMap<SubjectRef, HashSet<CacheKey>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResolutionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            by_subject: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key` if still fresh, otherwise compute it
    ///
    /// `current_revision` reports a contributor's live revision. `compute`
    /// runs without any cache lock held; if two callers race, the last insert
    /// wins.
    pub fn get_or_compute<R, C>(
        &self,
        key: CacheKey,
        current_revision: R,
        compute: C,
    ) -> StoreResult<CachedValue>
    where
        R: Fn(&SubjectRef) -> StoreResult<Revision>,
        C: FnOnce() -> StoreResult<(CachedValue, Contributors)>,
    {
        let cached = self.entries.lock().get(&key).cloned();
        if let Some(entry) = cached {
            if self.is_fresh(&entry, &current_revision)? {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value);
            }
            tracing::trace!("Stale cache entry for {:?}", key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let (value, contributors) = compute()?;
        self.insert(key, value.clone(), contributors);
        Ok(value)
    }

    fn is_fresh<R>(&self, entry: &CacheEntry, current_revision: &R) -> StoreResult<bool>
    where
        R: Fn(&SubjectRef) -> StoreResult<Revision>,
    {
        for (subject, revision) in entry.contributors.iter() {
            if current_revision(subject)? != *revision {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn insert(&self, key: CacheKey, value: CachedValue, contributors: Contributors) {
        for (subject, _) in &contributors {
            self.by_subject
                .entry(subject.clone())
                .or_default()
                .insert(key.clone());
        }

        let entry = CacheEntry {
            value,
            contributors: contributors.into(),
        };
        let evicted = self.entries.lock().push(key.clone(), entry);

        if let Some((evicted_key, evicted)) = evicted {
            if evicted_key != key {
                self.unindex(&evicted_key, &evicted);
            }
        }
    }

    fn unindex(&self, key: &CacheKey, entry: &CacheEntry) {
        for (subject, _) in entry.contributors.iter() {
            if let Some(mut keys) = self.by_subject.get_mut(subject) {
                keys.remove(key);
            }
            self.by_subject.remove_if(subject, |_, keys| keys.is_empty());
        }
    }

    /// Drop every entry `subject` contributed to. Returns how many were dropped.
    pub fn invalidate(&self, subject: &SubjectRef) -> usize {
        let Some((_, keys)) = self.by_subject.remove(subject) else {
            return 0;
        };

        let mut entries = self.entries.lock();
        let dropped = keys.iter().filter(|k| entries.pop(*k).is_some()).count();
        drop(entries);

        if dropped > 0 {
            self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::debug!("Invalidated {} cache entries for {}", dropped, subject);
        }
        dropped
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        drop(entries);

        self.by_subject.clear();
        self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
        tracing::debug!("Cleared resolution cache ({} entries)", dropped);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key(id: &str, node: &str) -> CacheKey {
        CacheKey::new(
            &SubjectRef::user(id),
            &ContextSet::empty(),
            Query::Permission(node.to_string()),
        )
    }

    fn computed(
        value: Tristate,
        contributors: &[(&str, u64)],
    ) -> StoreResult<(CachedValue, Contributors)> {
        Ok((
            CachedValue::Permission(value),
            contributors
                .iter()
                .map(|(id, r)| (SubjectRef::user(*id), Revision(*r)))
                .collect(),
        ))
    }

    #[test]
    fn test_hit_while_revisions_match() {
        let cache = ResolutionCache::new(16);
        let revisions: Mutex<HashMap<SubjectRef, Revision>> = Mutex::new(HashMap::new());
        let current = |s: &SubjectRef| -> StoreResult<Revision> {
            Ok(revisions.lock().get(s).copied().unwrap_or(Revision::NONE))
        };

        let first = cache
            .get_or_compute(key("a", "x"), current, || computed(Tristate::True, &[("a", 0)]))
            .unwrap();
        assert_eq!(first, CachedValue::Permission(Tristate::True));

        let second = cache
            .get_or_compute(key("a", "x"), current, || computed(Tristate::False, &[("a", 0)]))
            .unwrap();
        assert_eq!(second, CachedValue::Permission(Tristate::True));
        assert_eq!(cache.stats().hits, 1);

        revisions.lock().insert(SubjectRef::user("a"), Revision(5));
        let third = cache
            .get_or_compute(key("a", "x"), current, || computed(Tristate::False, &[("a", 5)]))
            .unwrap();
        assert_eq!(third, CachedValue::Permission(Tristate::False));
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_invalidate_by_contributor() {
        let cache = ResolutionCache::new(16);
        let current = |_: &SubjectRef| -> StoreResult<Revision> { Ok(Revision::NONE) };

        cache
            .get_or_compute(key("a", "x"), current, || {
                computed(Tristate::True, &[("a", 0), ("shared", 0)])
            })
            .unwrap();
        cache
            .get_or_compute(key("b", "x"), current, || {
                computed(Tristate::True, &[("b", 0), ("shared", 0)])
            })
            .unwrap();
        cache
            .get_or_compute(key("c", "x"), current, || computed(Tristate::True, &[("c", 0)]))
            .unwrap();

        assert_eq!(cache.invalidate(&SubjectRef::user("shared")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(&SubjectRef::user("shared")), 0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResolutionCache::new(2);
        let current = |_: &SubjectRef| -> StoreResult<Revision> { Ok(Revision::NONE) };

        for id in ["a", "b", "c"] {
            cache
                .get_or_compute(key(id, "x"), current, || computed(Tristate::True, &[(id, 0)]))
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.invalidate(&SubjectRef::user("a")), 0);

        cache.clear();
        assert!(cache.is_empty());
    }
}
