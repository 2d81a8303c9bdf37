//! pexrs SDK - Permission Data Model
//!
//! This crate contains the plain data types shared by the storage engine,
//! the resolver and host adapters. It holds no state and does no I/O.
//!
//! # Modules
//!
//! - [`subject`] - Subject identities (`type:identifier`)
//! - [`context`] - Context sets scoping when a rule applies
//! - [`data`] - Per-subject permission/option/parent records and revisions
//! - [`node`] - Permission node patterns, matching and validation

pub mod context;
pub mod data;
pub mod node;
pub mod subject;

pub use context::{ContextSet, ContextValue};
pub use data::{
    Mutation, OptionEntry, ParentEntry, PermissionEntry, Revision, SubjectData, Tristate,
    Versioned,
};
pub use node::{match_node, MatchKind, PatternError};
pub use subject::{SubjectRef, SUBJECTS_DEFAULTS, SUBJECTS_GROUP, SUBJECTS_USER};
