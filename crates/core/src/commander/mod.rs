//! Host-facing actor interface
//!
//! Everything that can issue commands or receive output (a player, the
//! console, an RCON session) is a [`Commander`]. Optional capabilities are
//! advertised with [`CommanderFlags`] rather than a type hierarchy.

pub mod callbacks;
pub mod message;

use bitflags::bitflags;

use pexrs_sdk::{ContextSet, SubjectRef};

pub use callbacks::{CallbackError, CallbackRegistry, Continuation, Listing};
pub use message::{Message, PaginatedMessage, Paginator};

bitflags! {
    /// Optional commander capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommanderFlags: u32 {
        /// `locale()` returns a language tag
        const HAS_LOCALE = 0x01;
        /// `subject()` identifies a stored subject
        const HAS_UNIQUE_ID = 0x02;
    }
}

/// An actor that issues commands and receives messages
pub trait Commander: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    fn flags(&self) -> CommanderFlags;

    /// The subject permissions are checked against, if any
    fn subject(&self) -> Option<SubjectRef> {
        None
    }

    fn locale(&self) -> Option<&str> {
        None
    }

    /// Contexts the actor is currently in
    fn contexts(&self) -> ContextSet {
        ContextSet::empty()
    }

    /// Permission answer for actors without a subject
    fn has_permission(&self, _permission: &str) -> bool {
        false
    }

    fn send(&self, message: Message);
}

/// Stable key identifying a commander for callback ownership
pub fn actor_key(commander: &dyn Commander) -> String {
    match commander.subject() {
        Some(subject) if commander.flags().contains(CommanderFlags::HAS_UNIQUE_ID) => {
            subject.to_string()
        }
        _ => format!("name:{}", commander.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Player {
        name: String,
        subject: SubjectRef,
    }

    impl Commander for Player {
        fn name(&self) -> &str {
            &self.name
        }

        fn flags(&self) -> CommanderFlags {
            CommanderFlags::HAS_UNIQUE_ID | CommanderFlags::HAS_LOCALE
        }

        fn subject(&self) -> Option<SubjectRef> {
            Some(self.subject.clone())
        }

        fn locale(&self) -> Option<&str> {
            Some("en_US")
        }

        fn send(&self, _message: Message) {}
    }

    struct Console;

    impl Commander for Console {
        fn name(&self) -> &str {
            "Console"
        }

        fn flags(&self) -> CommanderFlags {
            CommanderFlags::empty()
        }

        fn has_permission(&self, _permission: &str) -> bool {
            true
        }

        fn send(&self, _message: Message) {}
    }

    #[test]
    fn test_actor_keys() {
        let player = Player {
            name: "Alice".into(),
            subject: SubjectRef::user("alice"),
        };
        assert_eq!(actor_key(&player), "user:alice");
        assert_eq!(actor_key(&Console), "name:Console");
    }

    #[test]
    fn test_default_capabilities() {
        assert!(Console.subject().is_none());
        assert!(Console.locale().is_none());
        assert!(Console.contexts().is_empty());
        assert!(!Console.flags().contains(CommanderFlags::HAS_LOCALE));
    }
}
