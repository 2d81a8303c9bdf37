//! Error types for storage operations

use std::fmt::Display;

use pexrs_sdk::{PatternError, Revision, SubjectRef};

/// Error type for data store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend I/O failed; the operation was aborted with no partial state
    #[error("Store '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// Compare-and-set found a newer revision than the caller read
    #[error("Stale write to {subject}: expected {expected}, found {actual}")]
    StaleWrite {
        subject: SubjectRef,
        expected: Revision,
        actual: Revision,
    },

    /// Malformed permission pattern or option key
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        #[source]
        reason: PatternError,
    },

    /// Identifier rejected by its subject type
    #[error("Invalid subject {subject}: {reason}")]
    InvalidSubject { subject: SubjectRef, reason: String },

    /// Deletion refused while another subject inherits from this one
    #[error("{subject} is still inherited by {referrer}")]
    SubjectReferenced {
        subject: SubjectRef,
        referrer: SubjectRef,
    },
}

impl StoreError {
    /// Build an `Unavailable` error from any displayable cause
    pub fn unavailable(backend: &str, reason: impl Display) -> Self {
        Self::Unavailable {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether re-reading and retrying may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleWrite { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
