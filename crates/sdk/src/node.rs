//! Permission node patterns
//!
//! Nodes are dot-separated (`files.delete`, `@css/ban`). A stored pattern is
//! either an exact node or a wildcard:
//! - `files.delete` matches only `files.delete`
//! - `files.*` matches every node strictly below `files`
//! - `*` matches every node
//!
//! Matching is case-insensitive; nodes are normalized to lowercase when stored
//! and when queried.

/// Segment separator for permission nodes
pub const NODE_SEPARATOR: char = '.';

/// Wildcard segment
pub const WILDCARD: &str = "*";

/// Reasons a permission pattern or option key is rejected at write time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern contains whitespace or control characters")]
    InvalidCharacter,

    #[error("pattern contains an empty segment")]
    EmptySegment,

    #[error("wildcard is only allowed as the whole final segment")]
    MisplacedWildcard,
}

/// How a pattern matched a queried node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The pattern is the node itself
    Exact,
    /// Wildcard match; `depth` is the number of prefix segments before the `*`
    Wildcard { depth: usize },
}

impl MatchKind {
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact)
    }

    /// Prefix depth of a wildcard match (0 for `*`, unused for exact)
    pub fn depth(&self) -> usize {
        match self {
            Self::Exact => usize::MAX,
            Self::Wildcard { depth } => *depth,
        }
    }
}

/// Lowercase a node or option key for storage and lookup
pub fn normalize(node: &str) -> String {
    node.trim().to_lowercase()
}

/// Validate a permission pattern before it is written
pub fn validate_permission(pattern: &str) -> Result<(), PatternError> {
    validate_text(pattern)?;

    let segments: Vec<&str> = pattern.split(NODE_SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PatternError::EmptySegment);
    }
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.contains('*') && (i != last || *segment != WILDCARD) {
            return Err(PatternError::MisplacedWildcard);
        }
    }
    Ok(())
}

/// Validate an option key before it is written
pub fn validate_option_key(key: &str) -> Result<(), PatternError> {
    validate_text(key)
}

fn validate_text(text: &str) -> Result<(), PatternError> {
    if text.is_empty() {
        return Err(PatternError::Empty);
    }
    if text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PatternError::InvalidCharacter);
    }
    Ok(())
}

/// Match a stored (normalized) pattern against a queried (normalized) node
pub fn match_node(pattern: &str, node: &str) -> Option<MatchKind> {
    if pattern == node {
        return Some(MatchKind::Exact);
    }
    if pattern == WILDCARD {
        return (!node.is_empty()).then_some(MatchKind::Wildcard { depth: 0 });
    }

    let prefix = pattern.strip_suffix(".*")?;
    let rest = node.strip_prefix(prefix)?.strip_prefix(NODE_SEPARATOR)?;
    if rest.is_empty() {
        return None;
    }
    Some(MatchKind::Wildcard {
        depth: prefix.split(NODE_SEPARATOR).count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(match_node("files.delete", "files.delete"), Some(MatchKind::Exact));
        assert_eq!(match_node("files.delete", "files.read"), None);
    }

    #[test]
    fn test_wildcard_match() {
        assert_eq!(
            match_node("files.*", "files.delete"),
            Some(MatchKind::Wildcard { depth: 1 })
        );
        assert_eq!(
            match_node("files.*", "files.delete.all"),
            Some(MatchKind::Wildcard { depth: 1 })
        );
        assert_eq!(match_node("files.*", "files"), None);
        assert_eq!(match_node("files.*", "filesystem.read"), None);
    }

    #[test]
    fn test_root_wildcard() {
        assert_eq!(match_node("*", "anything.at.all"), Some(MatchKind::Wildcard { depth: 0 }));
        assert_eq!(match_node("*", ""), None);
    }

    #[test]
    fn test_depth_reflects_prefix() {
        let shallow = match_node("a.*", "a.b.c").unwrap();
        let deep = match_node("a.b.*", "a.b.c").unwrap();
        assert!(deep.depth() > shallow.depth());
    }

    #[test]
    fn test_validate_permission() {
        assert!(validate_permission("files.delete").is_ok());
        assert!(validate_permission("files.*").is_ok());
        assert!(validate_permission("*").is_ok());
        assert!(validate_permission("@css/ban").is_ok());

        assert_eq!(validate_permission(""), Err(PatternError::Empty));
        assert_eq!(validate_permission("files delete"), Err(PatternError::InvalidCharacter));
        assert_eq!(validate_permission("files..delete"), Err(PatternError::EmptySegment));
        assert_eq!(validate_permission(".files"), Err(PatternError::EmptySegment));
        assert_eq!(validate_permission("files.*.delete"), Err(PatternError::MisplacedWildcard));
        assert_eq!(validate_permission("files.del*"), Err(PatternError::MisplacedWildcard));
    }

    #[test]
    fn test_validate_option_key() {
        assert!(validate_option_key("prefix").is_ok());
        assert_eq!(validate_option_key(""), Err(PatternError::Empty));
        assert_eq!(validate_option_key("chat prefix"), Err(PatternError::InvalidCharacter));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Files.Delete "), "files.delete");
    }
}
