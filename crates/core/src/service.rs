//! Permission service
//!
//! Composes the store, resolver, cache, transactions, ladders and callback
//! registry into the one object a host talks to. Built from a [`PexConfig`],
//! usually once at load time, and optionally installed globally with
//! [`init_service`](crate::globals::init_service).

use std::path::Path;
use std::sync::Arc;

use pexrs_engine::{
    export_all, import_batch, ChangeEvent, DataStore, FileStore, ListenerKey, MemoryStore,
    Snapshot, StoreError, StoreResult,
};
use pexrs_sdk::{ContextSet, ContextValue, SubjectRef, Tristate};

use crate::cache::{CacheStats, ResolutionCache};
use crate::commander::{
    actor_key, CallbackError, CallbackRegistry, Commander, Continuation, Listing, Message,
    PaginatedMessage, Paginator,
};
use crate::config::{resolve_data_path, BackendConfig, ConfigError, PexConfig};
use crate::contexts::ContextInheritance;
use crate::graph::PermissionGraph;
use crate::ladders::{demote, promote, LadderChange, RankLadders};
use crate::registry::{SubjectTypeDescriptor, SubjectTypeRegistry};
use crate::resolver::Resolver;
use crate::tasks::{CompletionQueue, QueueError, WorkerPool};
use crate::transactions::{CommitGate, CommitSummary, Transaction, TransactionError, TransactionManager};

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("Unknown ladder '{0}'")]
    UnknownLadder(String),

    #[error("Failed to start workers: {0}")]
    Workers(#[from] std::io::Error),

    #[error("Permission service already initialized")]
    AlreadyInitialized,
}

/// How a resolution collapses to allow/deny
#[derive(Debug, Clone, Copy)]
struct Decision {
    undefined_default: bool,
    fail_closed: bool,
}

impl Decision {
    fn decide(self, subject: &SubjectRef, permission: &str, result: StoreResult<Tristate>) -> bool {
        match result {
            Ok(value) => value.as_bool_or(self.undefined_default),
            Err(err) => {
                tracing::warn!(
                    "Permission check {} for {} failed: {}",
                    permission,
                    subject,
                    err
                );
                !self.fail_closed && self.undefined_default
            }
        }
    }
}

pub struct PermissionService {
    config: PexConfig,
    store: Arc<dyn DataStore>,
    registry: Arc<SubjectTypeRegistry>,
    contexts: Arc<ContextInheritance>,
    cache: Arc<ResolutionCache>,
    resolver: Arc<Resolver>,
    transactions: TransactionManager,
    ladders: RankLadders,
    callbacks: CallbackRegistry,
    completions: Arc<CompletionQueue>,
    workers: WorkerPool,
    paginator: Paginator,
    decision: Decision,
    listener: ListenerKey,
}

impl PermissionService {
    /// Load `<base>/configs/permissions.toml` and open its backend
    pub fn load(base: &Path) -> Result<Self, ServiceError> {
        let config = PexConfig::load(base)?;
        Self::from_config(config, base)
    }

    /// Open the configured backend and build the service on it
    pub fn from_config(config: PexConfig, base: &Path) -> Result<Self, ServiceError> {
        let store = open_backend(&config, base)?;
        Self::new(config, store)
    }

    /// Build the service over an already opened store
    pub fn new(config: PexConfig, store: Arc<dyn DataStore>) -> Result<Self, ServiceError> {
        let registry = Arc::new(SubjectTypeRegistry::with_builtins());

        let contexts = Arc::new(ContextInheritance::new());
        for (child, parents) in config.inheritance() {
            contexts.set_parents(child, parents);
        }

        let cache = Arc::new(ResolutionCache::new(config.cache.capacity));
        let gate = Arc::new(CommitGate::new());

        let graph = PermissionGraph::new(store.clone(), registry.clone())
            .with_implicit_defaults(config.implicit_defaults);
        let resolver = Arc::new(
            Resolver::new(graph, cache.clone(), contexts.clone(), gate.clone())
                .with_default_rank(config.default_rank),
        );
        let transactions =
            TransactionManager::new(store.clone(), cache.clone(), registry.clone(), gate);

        let ladders = RankLadders::new();
        for ladder in config.rank_ladders() {
            ladders.insert(ladder);
        }

        // Changes that bypass the transaction manager (reloads, backend tools)
        let invalidate = cache.clone();
        let listener = store.subscribe(Arc::new(move |event: &ChangeEvent| {
            invalidate.invalidate(&event.subject);
        }));

        let workers = WorkerPool::new("pexrs-worker", config.workers.threads)?;

        tracing::info!(
            "Permission service ready on '{}' backend ({} ladder(s), {} worker(s))",
            store.name(),
            ladders.names().len(),
            workers.size()
        );

        Ok(Self {
            callbacks: CallbackRegistry::new(config.callback_ttl()),
            paginator: Paginator::new(config.pagination.page_size),
            decision: Decision {
                undefined_default: config.undefined_default,
                fail_closed: config.fail_closed,
            },
            completions: Arc::new(CompletionQueue::default()),
            config,
            store,
            registry,
            contexts,
            cache,
            resolver,
            transactions,
            ladders,
            workers,
            listener,
        })
    }

    pub fn config(&self) -> &PexConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &SubjectTypeRegistry {
        &self.registry
    }

    pub fn ladders(&self) -> &RankLadders {
        &self.ladders
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Tristate permission value
    pub fn resolve(
        &self,
        subject: &SubjectRef,
        permission: &str,
        contexts: &ContextSet,
    ) -> StoreResult<Tristate> {
        self.resolver.resolve(subject, permission, contexts)
    }

    /// Boolean permission check
    ///
    /// Undefined permissions use `undefined-default`; a backend failure denies
    /// unless `fail-closed` is off.
    pub fn has_permission(
        &self,
        subject: &SubjectRef,
        permission: &str,
        contexts: &ContextSet,
    ) -> bool {
        let result = self.resolver.resolve(subject, permission, contexts);
        self.decision.decide(subject, permission, result)
    }

    pub fn option(
        &self,
        subject: &SubjectRef,
        key: &str,
        contexts: &ContextSet,
    ) -> StoreResult<Option<String>> {
        self.resolver.resolve_option(subject, key, contexts)
    }

    pub fn rank(&self, subject: &SubjectRef, contexts: &ContextSet) -> StoreResult<i32> {
        self.resolver.resolve_rank(subject, contexts)
    }

    /// Direct parents applicable under `contexts`
    pub fn parents(
        &self,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> StoreResult<Vec<SubjectRef>> {
        self.resolver.graph().direct_parents(subject, contexts)
    }

    /// Subjects listing `subject` as a parent
    pub fn children(&self, subject: &SubjectRef) -> StoreResult<Vec<SubjectRef>> {
        self.resolver.graph().children_of(subject)
    }

    /// Check a commander in its current contexts
    ///
    /// Commanders without a subject (the console) answer for themselves.
    pub fn check_commander(&self, commander: &dyn Commander, permission: &str) -> bool {
        match commander.subject() {
            Some(subject) => self.has_permission(&subject, permission, &commander.contexts()),
            None => commander.has_permission(permission),
        }
    }

    /// Check on a worker thread; `callback` runs on the next
    /// [`process_completions`](Self::process_completions)
    pub fn check_async<F>(
        &self,
        subject: SubjectRef,
        permission: String,
        contexts: ContextSet,
        callback: F,
    ) -> Result<(), QueueError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let resolver = self.resolver.clone();
        let completions = self.completions.clone();
        let decision = self.decision;

        self.workers.execute(move || {
            let result = resolver.resolve(&subject, &permission, &contexts);
            let allowed = decision.decide(&subject, &permission, result);
            if completions
                .queue_task_blocking(move || callback(allowed))
                .is_err()
            {
                tracing::error!("Dropped async result for {} on {}", subject, permission);
            }
        })
    }

    /// Run completed async callbacks; call once per host tick
    pub fn process_completions(&self) -> usize {
        self.completions.process_queued_tasks()
    }

    pub fn pending_completions(&self) -> usize {
        self.completions.queued_task_count()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn begin(&self) -> Transaction<'_> {
        self.transactions.begin()
    }

    pub fn promote(
        &self,
        ladder: &str,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> Result<LadderChange, ServiceError> {
        let ladder = self
            .ladders
            .get(ladder)
            .ok_or_else(|| ServiceError::UnknownLadder(ladder.to_string()))?;
        Ok(promote(&self.transactions, &ladder, subject, contexts)?)
    }

    pub fn demote(
        &self,
        ladder: &str,
        subject: &SubjectRef,
        contexts: &ContextSet,
    ) -> Result<LadderChange, ServiceError> {
        let ladder = self
            .ladders
            .get(ladder)
            .ok_or_else(|| ServiceError::UnknownLadder(ladder.to_string()))?;
        Ok(demote(&self.transactions, &ladder, subject, contexts)?)
    }

    /// Delete all of a subject's data
    ///
    /// Refused while another subject still lists it as a parent. The referrer
    /// scan runs inside the commit, so a parent link committed concurrently
    /// is either seen by it or conflicts with it.
    pub fn delete_subject(&self, subject: &SubjectRef) -> Result<CommitSummary, ServiceError> {
        let graph = self.resolver.graph();
        let mut tx = self.begin();
        tx.clear(subject)?;

        let summary = tx
            .commit_checked(|| match graph.referrer_of(subject)? {
                Some(referrer) => Err(StoreError::SubjectReferenced {
                    subject: subject.clone(),
                    referrer,
                }),
                None => Ok(()),
            })
            .map_err(|err| match err {
                TransactionError::Store(err) => ServiceError::Store(err),
                other => ServiceError::Transaction(other),
            })?;
        tracing::info!("Deleted subject {}", subject);
        Ok(summary)
    }

    /// Register a subject type at runtime
    pub fn register_subject_type(&self, subject_type: &str, descriptor: SubjectTypeDescriptor) {
        self.registry.register(subject_type, descriptor);
        // Default data may have changed for cached subjects
        self.cache.clear();
    }

    /// Replace the context values `child` inherits
    pub fn set_context_parents(&self, child: ContextValue, parents: Vec<ContextValue>) {
        self.contexts.set_parents(child, parents);
        self.cache.clear();
    }

    // ========================================================================
    // Backend
    // ========================================================================

    /// Re-read the backend; subscribers and the cache see every change
    pub fn reload(&self) -> StoreResult<Vec<ChangeEvent>> {
        self.store.reload()
    }

    /// Snapshot of every non-transient subject
    pub fn export(&self) -> StoreResult<Snapshot> {
        let mut snapshot = export_all(self.store.as_ref())?;
        snapshot
            .subjects
            .retain(|(subject, _)| !self.registry.is_transient(subject.subject_type()));
        Ok(snapshot)
    }

    /// Write a snapshot in one commit
    pub fn import(&self, snapshot: &Snapshot) -> StoreResult<Vec<ChangeEvent>> {
        for (subject, _) in &snapshot.subjects {
            self.registry.validate(subject)?;
        }
        let batch = import_batch(self.store.as_ref(), snapshot)?;
        let events = self.transactions.commit_batch(batch)?;
        tracing::info!("Imported {} subject(s)", events.len());
        Ok(events)
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Send the first page of a listing; later pages are reached by callback
    pub fn send_paginated(
        &self,
        commander: &dyn Commander,
        title: impl Into<String>,
        header: Option<String>,
        lines: Vec<String>,
    ) {
        let listing = Arc::new(Listing {
            title: title.into(),
            header,
            lines,
        });
        self.show_page(commander, listing, 1);
    }

    fn show_page(&self, commander: &dyn Commander, listing: Arc<Listing>, page: usize) {
        let (page, lines) = self.paginator.page(&listing.lines, page);
        let total_pages = self.paginator.page_count(listing.lines.len());
        let actor = actor_key(commander);

        let link = |target: usize| {
            self.callbacks.register(
                &actor,
                Continuation::ShowPage {
                    listing: listing.clone(),
                    page: target,
                },
            )
        };
        let previous = (page > 1).then(|| link(page - 1));
        let next = (page < total_pages).then(|| link(page + 1));

        commander.send(Message::Paginated(PaginatedMessage {
            title: listing.title.clone(),
            header: listing.header.clone(),
            lines: lines.to_vec(),
            page,
            total_pages,
            next,
            previous,
        }));
    }

    /// Run the continuation behind a callback token
    pub fn run_callback(&self, commander: &dyn Commander, token: &str) -> Result<(), ServiceError> {
        match self.callbacks.lookup(&actor_key(commander), token)? {
            Continuation::ShowPage { listing, page } => self.show_page(commander, listing, page),
        }
        Ok(())
    }

    /// Drop expired callback tokens
    pub fn purge_callbacks(&self) -> usize {
        self.callbacks.purge_expired()
    }
}

/// Dropping the service waits for in-flight async checks; their callbacks run
/// on the dropping thread.
impl Drop for PermissionService {
    fn drop(&mut self) {
        self.store.unsubscribe(self.listener);

        let completions = &self.completions;
        let mut drained = 0;
        self.workers.shutdown_with(|| {
            drained += completions.process_queued_tasks();
        });
        drained += completions.process_queued_tasks();
        if drained > 0 {
            tracing::debug!("Ran {} pending completion(s) on shutdown", drained);
        }
    }
}

/// Open the backend named by `default-backend`
pub fn open_backend(config: &PexConfig, base: &Path) -> Result<Arc<dyn DataStore>, ServiceError> {
    let name = config.default_backend.as_str();
    let store: Arc<dyn DataStore> = match config.backend()? {
        BackendConfig::File { path } => {
            Arc::new(FileStore::open(name, resolve_data_path(base, path))?)
        }
        BackendConfig::Memory => Arc::new(MemoryStore::new(name)),
    };
    Ok(store)
}
