//! Subject identities
//!
//! Every permission holder (user, group, the per-type defaults...) is named by
//! a [`SubjectRef`]: a subject type tag plus an identifier unique within that
//! type. The textual form is `type:identifier`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subject type used for players and other individual actors
pub const SUBJECTS_USER: &str = "user";

/// Subject type used for permission groups
pub const SUBJECTS_GROUP: &str = "group";

/// Subject type holding the fallback data for each subject type
pub const SUBJECTS_DEFAULTS: &str = "default";

/// Immutable reference to a permission-holding subject
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "type")]
    subject_type: String,
    identifier: String,
}

impl SubjectRef {
    /// Create a reference from a type tag and identifier
    pub fn new(subject_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Shorthand for a `user` subject
    pub fn user(identifier: impl Into<String>) -> Self {
        Self::new(SUBJECTS_USER, identifier)
    }

    /// Shorthand for a `group` subject
    pub fn group(identifier: impl Into<String>) -> Self {
        Self::new(SUBJECTS_GROUP, identifier)
    }

    /// The defaults subject for a subject type (`default:<type>`)
    pub fn defaults_for(subject_type: &str) -> Self {
        Self::new(SUBJECTS_DEFAULTS, subject_type)
    }

    /// The global defaults subject (`default:default`)
    pub fn global_defaults() -> Self {
        Self::new(SUBJECTS_DEFAULTS, SUBJECTS_DEFAULTS)
    }

    /// Parse `type:identifier`
    ///
    /// Only the first `:` separates; identifiers may contain further colons.
    /// Returns `None` if either half is empty.
    pub fn parse(input: &str) -> Option<Self> {
        let (subject_type, identifier) = input.split_once(':')?;
        if subject_type.is_empty() || identifier.is_empty() {
            return None;
        }
        Some(Self::new(subject_type, identifier))
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether this is one of the `default:*` fallback subjects
    pub fn is_defaults(&self) -> bool {
        self.subject_type == SUBJECTS_DEFAULTS
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let subject = SubjectRef::parse("group:admin").unwrap();
        assert_eq!(subject.subject_type(), "group");
        assert_eq!(subject.identifier(), "admin");
        assert_eq!(subject.to_string(), "group:admin");
    }

    #[test]
    fn test_parse_keeps_extra_colons() {
        let subject = SubjectRef::parse("server:eu:1").unwrap();
        assert_eq!(subject.subject_type(), "server");
        assert_eq!(subject.identifier(), "eu:1");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(SubjectRef::parse("nocolon").is_none());
        assert!(SubjectRef::parse(":admin").is_none());
        assert!(SubjectRef::parse("group:").is_none());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(SubjectRef::user("alice"), SubjectRef::new("user", "alice"));
        assert_ne!(SubjectRef::user("alice"), SubjectRef::group("alice"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SubjectRef::defaults_for("user").to_string(), "default:user");
        assert!(SubjectRef::global_defaults().is_defaults());
        assert!(!SubjectRef::user("bob").is_defaults());
    }
}
