use tracing::debug;

use crate::core::message::{Message, Role};
use crate::core::session::Session;
use crate::core::sse::StreamEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftStep {
    Appended,
    Completed { session_id: String },
    Failed { message: String },
    /// The draft already terminated; nothing was changed.
    Ignored,
}

/// The assistant message currently being filled by a stream.
///
/// Holds the index of the placeholder inside the active [`Session`]. Content
/// fragments are the only way the message changes while the draft is open,
/// and exactly one terminal event closes it.
#[derive(Debug)]
pub struct AssistantDraft {
    index: usize,
    terminated: bool,
}

impl AssistantDraft {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            terminated: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn apply(&mut self, session: &mut Session, event: StreamEvent) -> DraftStep {
        if self.terminated {
            debug!(?event, "stream event after termination ignored");
            return DraftStep::Ignored;
        }

        match event {
            StreamEvent::Content(fragment) => {
                if let Some(message) = self.message_mut(session) {
                    message.content.push_str(&fragment);
                }
                DraftStep::Appended
            }
            StreamEvent::Done { session_id } => {
                self.close(session);
                DraftStep::Completed { session_id }
            }
            StreamEvent::Error(message) => {
                self.close(session);
                DraftStep::Failed { message }
            }
        }
    }

    /// Terminate without a server event (stream closed early).
    pub fn abandon(&mut self, session: &mut Session) {
        if !self.terminated {
            self.close(session);
        }
    }

    pub fn content<'a>(&self, session: &'a Session) -> Option<&'a str> {
        session
            .messages
            .get(self.index)
            .filter(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str())
    }

    fn close(&mut self, session: &mut Session) {
        self.terminated = true;
        if let Some(message) = self.message_mut(session) {
            message.complete = true;
        }
    }

    fn message_mut<'a>(&self, session: &'a mut Session) -> Option<&'a mut Message> {
        session
            .messages
            .get_mut(self.index)
            .filter(|message| message.role == Role::Assistant && !message.complete)
    }
}
