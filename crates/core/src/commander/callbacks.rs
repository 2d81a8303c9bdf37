//! Callback tokens
//!
//! Interactive output (the "next page" link of a listing) is backed by a
//! token the host hands back when the actor clicks it. Tokens map to plain
//! data continuations, stay valid until they expire, and only work for the
//! actor they were issued to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Callback errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("Unknown callback token '{0}'")]
    UnknownToken(String),

    #[error("Callback token '{0}' has expired")]
    Expired(String),

    /// The token belongs to another actor
    #[error("Callback token '{0}' was not issued to this actor")]
    WrongActor(String),
}

/// Lines shown page by page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub title: String,
    pub header: Option<String>,
    pub lines: Vec<String>,
}

/// What a token does when run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    ShowPage { listing: Arc<Listing>, page: usize },
}

struct CallbackEntry {
    actor: String,
    continuation: Continuation,
    expires_at: Instant,
}

/// Token → continuation map with expiry
pub struct CallbackRegistry {
    entries: Mutex<HashMap<String, CallbackEntry>>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl CallbackRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token running `continuation` for `actor`
    pub fn register(&self, actor: &str, continuation: Continuation) -> String {
        let token = format!("cb-{:x}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = CallbackEntry {
            actor: actor.to_string(),
            continuation,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(token.clone(), entry);
        tracing::trace!("Issued callback token {} to {}", token, actor);
        token
    }

    /// Look up the continuation behind `token` for `actor`
    ///
    /// Tokens are not consumed; an actor may click the same link twice.
    pub fn lookup(&self, actor: &str, token: &str) -> Result<Continuation, CallbackError> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(token) else {
            return Err(CallbackError::UnknownToken(token.to_string()));
        };

        if Instant::now() >= entry.expires_at {
            entries.remove(token);
            return Err(CallbackError::Expired(token.to_string()));
        }
        if entry.actor != actor {
            tracing::warn!("{} tried to run a callback issued to {}", actor, entry.actor);
            return Err(CallbackError::WrongActor(token.to_string()));
        }
        Ok(entry.continuation.clone())
    }

    /// Drop expired tokens. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize) -> Continuation {
        Continuation::ShowPage {
            listing: Arc::new(Listing {
                title: "Permissions".into(),
                header: None,
                lines: vec!["a".into()],
            }),
            page: n,
        }
    }

    #[test]
    fn test_register_and_reuse() {
        let registry = CallbackRegistry::default();
        let token = registry.register("user:alice", page(2));

        assert_eq!(registry.lookup("user:alice", &token), Ok(page(2)));
        assert_eq!(registry.lookup("user:alice", &token), Ok(page(2)));
        assert_ne!(registry.register("user:alice", page(3)), token);
    }

    #[test]
    fn test_bound_to_actor() {
        let registry = CallbackRegistry::default();
        let token = registry.register("user:alice", page(1));

        assert_eq!(
            registry.lookup("user:bob", &token),
            Err(CallbackError::WrongActor(token.clone()))
        );
        assert_eq!(
            registry.lookup("user:alice", "cb-ffff"),
            Err(CallbackError::UnknownToken("cb-ffff".into()))
        );
    }

    #[test]
    fn test_expiry() {
        let registry = CallbackRegistry::new(Duration::ZERO);
        let token = registry.register("user:alice", page(1));

        assert_eq!(
            registry.lookup("user:alice", &token),
            Err(CallbackError::Expired(token.clone()))
        );
        assert!(registry.is_empty());

        registry.register("user:alice", page(1));
        registry.register("user:bob", page(1));
        assert_eq!(registry.purge_expired(), 2);
    }
}
