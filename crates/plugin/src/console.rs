//! Reference commanders

use crossbeam_channel::Sender;

use pexrs_core::commander::{Commander, CommanderFlags, Message, PaginatedMessage};
use pexrs_sdk::{ContextSet, SubjectRef};

/// The server console: every permission, output to the log
#[derive(Debug, Default)]
pub struct ConsoleCommander;

impl Commander for ConsoleCommander {
    fn name(&self) -> &str {
        "Console"
    }

    fn flags(&self) -> CommanderFlags {
        CommanderFlags::empty()
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }

    fn send(&self, message: Message) {
        match message {
            Message::Info(text) => tracing::info!("{}", text),
            Message::Debug(text) => tracing::debug!("{}", text),
            Message::Error(text) => tracing::error!("{}", text),
            Message::Paginated(page) => {
                for line in render_page(&page) {
                    tracing::info!("{}", line);
                }
            }
        }
    }
}

/// Format a page as plain lines
pub fn render_page(page: &PaginatedMessage) -> Vec<String> {
    let mut lines = Vec::with_capacity(page.lines.len() + 2);
    lines.push(format!(
        "{} (page {}/{})",
        page.title, page.page, page.total_pages
    ));
    if let Some(header) = &page.header {
        lines.push(header.clone());
    }
    lines.extend(page.lines.iter().cloned());
    lines
}

/// A player identified by a subject; output goes to a channel the host drains
pub struct ChannelCommander {
    name: String,
    subject: SubjectRef,
    locale: Option<String>,
    contexts: ContextSet,
    outbox: Sender<Message>,
}

impl ChannelCommander {
    pub fn new(name: impl Into<String>, subject: SubjectRef, outbox: Sender<Message>) -> Self {
        Self {
            name: name.into(),
            subject,
            locale: None,
            contexts: ContextSet::empty(),
            outbox,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_contexts(mut self, contexts: ContextSet) -> Self {
        self.contexts = contexts;
        self
    }

    /// Move to new contexts, e.g. after changing worlds
    pub fn set_contexts(&mut self, contexts: ContextSet) {
        self.contexts = contexts;
    }
}

impl Commander for ChannelCommander {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> CommanderFlags {
        let mut flags = CommanderFlags::HAS_UNIQUE_ID;
        if self.locale.is_some() {
            flags |= CommanderFlags::HAS_LOCALE;
        }
        flags
    }

    fn subject(&self) -> Option<SubjectRef> {
        Some(self.subject.clone())
    }

    fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    fn contexts(&self) -> ContextSet {
        self.contexts.clone()
    }

    fn send(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            tracing::debug!("Dropped message for disconnected {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use pexrs_core::actor_key;

    #[test]
    fn test_console_has_everything() {
        let console = ConsoleCommander;
        assert!(console.has_permission("anything.at.all"));
        assert!(console.subject().is_none());
        assert_eq!(actor_key(&console), "name:Console");
        console.send(Message::info("hello"));
    }

    #[test]
    fn test_channel_commander() {
        let (tx, rx) = unbounded();
        let player = ChannelCommander::new("Alice", SubjectRef::user("alice"), tx)
            .with_locale("en")
            .with_contexts(ContextSet::of([("world", "nether")]));

        assert!(player.flags().contains(CommanderFlags::HAS_LOCALE));
        assert_eq!(player.locale(), Some("en"));
        assert_eq!(actor_key(&player), "user:alice");
        assert_eq!(player.contexts().len(), 1);

        player.send(Message::error("no"));
        assert_eq!(rx.try_recv().unwrap(), Message::error("no"));

        drop(rx);
        player.send(Message::info("lost"));
    }

    #[test]
    fn test_render_page() {
        let page = PaginatedMessage {
            title: "Permissions".into(),
            header: Some("node = value".into()),
            lines: vec!["a = true".into()],
            page: 1,
            total_pages: 2,
            next: Some("cb-1".into()),
            previous: None,
        };
        assert_eq!(
            render_page(&page),
            vec!["Permissions (page 1/2)", "node = value", "a = true"]
        );
    }
}
