//! pexrs Core - Permission Resolution
//!
//! This crate turns stored subject data into answers:
//! - Inheritance closure over the parent graph ([`graph`])
//! - Tristate permission, option and rank resolution ([`resolver`])
//! - Memoization with revision checks ([`cache`])
//! - Atomic multi-subject edits ([`transactions`]) and rank ladders
//! - Commanders, paginated output and callback tokens ([`commander`])
//! - The [`PermissionService`] facade and its global slot
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - Subject, context and data model types
//! - [`engine`] - Data store contract and backends

pub use pexrs_engine as engine;
pub use pexrs_sdk as sdk;

pub mod cache;
pub mod commander;
pub mod config;
pub mod contexts;
pub mod globals;
pub mod graph;
pub mod ladders;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod tasks;
pub mod transactions;

// Re-export commonly used items
pub use cache::{CacheStats, ResolutionCache};
pub use commander::{
    actor_key, CallbackError, CallbackRegistry, Commander, CommanderFlags, Message,
    PaginatedMessage, Paginator,
};
pub use config::{BackendConfig, ConfigError, ConfigResult, PexConfig};
pub use contexts::ContextInheritance;
pub use globals::{init_service, is_initialized, service, shutdown_service};
pub use graph::{Closure, ClosureNode, PermissionGraph};
pub use ladders::{Ladder, LadderChange, RankLadders};
pub use registry::{SubjectTypeDescriptor, SubjectTypeRegistry};
pub use resolver::Resolver;
pub use service::{open_backend, PermissionService, ServiceError};
pub use tasks::{CompletionQueue, QueueError, WorkerPool};
pub use transactions::{CommitSummary, Transaction, TransactionError, TransactionManager};
