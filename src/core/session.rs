use tracing::warn;

use crate::core::message::{Message, Role};

/// The conversation currently shown to the user.
///
/// `id` stays `None` until the backend confirms a new conversation; the
/// first confirmed identifier sticks for the lifetime of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The session had no identifier and now has one.
    Bound,
    /// The session already carried this identifier.
    Unchanged,
    /// The session already carried a different identifier, which was kept.
    Conflict,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: Some(id.into()),
            messages,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn bind_id(&mut self, server_id: &str) -> Binding {
        match self.id.as_deref() {
            None => {
                self.id = Some(server_id.to_string());
                Binding::Bound
            }
            Some(existing) if existing == server_id => Binding::Unchanged,
            Some(existing) => {
                warn!(
                    existing,
                    received = server_id,
                    "ignoring session id that differs from the bound one"
                );
                Binding::Conflict
            }
        }
    }

    /// Append a message and return its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Remove the message at `index` if it still has the expected role.
    ///
    /// Used to roll back optimistic entries; a list that was replaced in the
    /// meantime (logout, session switch) is left alone.
    pub fn retract(&mut self, index: usize, role: Role) -> Option<Message> {
        match self.messages.get(index) {
            Some(message) if message.role == role => Some(self.messages.remove(index)),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.id = None;
        self.messages.clear();
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_id_assigns_once_and_is_idempotent() {
        let mut session = Session::new();
        assert!(session.is_new());

        assert_eq!(session.bind_id("abc123"), Binding::Bound);
        assert_eq!(session.id.as_deref(), Some("abc123"));

        assert_eq!(session.bind_id("abc123"), Binding::Unchanged);
        assert_eq!(session.id.as_deref(), Some("abc123"));

        assert_eq!(session.bind_id("other"), Binding::Conflict);
        assert_eq!(session.id.as_deref(), Some("abc123"));
    }

    #[test]
    fn retract_only_removes_matching_role() {
        let mut session = Session::new();
        let user = session.push(Message::user("hi"));
        let assistant = session.push(Message::assistant_placeholder());

        assert!(session.retract(user, Role::Assistant).is_none());
        assert!(session.retract(assistant, Role::Assistant).is_some());
        assert!(session.retract(user, Role::User).is_some());
        assert!(session.messages.is_empty());
        assert!(session.retract(0, Role::User).is_none());
    }
}
