//! Observable client state.
//!
//! A single [`ChatState`] value lives inside a `tokio::sync::watch`
//! channel owned by the controller. Front ends subscribe and re-render on
//! every change; each streamed fragment is its own change.

use crate::api::models::ModelCatalog;
use crate::api::{SessionSummary, UserInfo};
use crate::core::backend::SessionContext;
use crate::core::session::Session;

const MAX_PENDING_NOTICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPhase {
    #[default]
    Idle,
    /// Request sent, no response yet.
    Sending,
    /// Response body is being consumed.
    Streaming,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub phase: SendPhase,
    pub context: Option<SessionContext>,
    pub session: Session,
    /// Bumped whenever `session` is replaced, so an exchange that outlives
    /// its session stops touching the new one.
    pub session_epoch: u64,
    pub sessions: Vec<SessionSummary>,
    pub date_filtered: bool,
    pub catalog: ModelCatalog,
    pub current_model: Option<String>,
    pub user: Option<UserInfo>,
    pub message_count: u64,
    pub input: String,
    pub notices: Vec<Notice>,
}

impl ChatState {
    pub fn is_logged_in(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.phase != SendPhase::Idle
    }

    pub fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(?kind, %text, "notice");
        if self.notices.len() >= MAX_PENDING_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(Notice { kind, text });
    }

    /// Replace the active conversation.
    pub fn switch_session(&mut self, session: Session) {
        self.session = session;
        self.session_epoch += 1;
    }

    /// Forget everything tied to the signed-in user.
    ///
    /// The send phase is left alone; an in-flight exchange resets it itself.
    pub fn sign_out(&mut self) {
        self.context = None;
        self.switch_session(Session::new());
        self.sessions.clear();
        self.date_filtered = false;
        self.user = None;
        self.message_count = 0;
        self.input.clear();
    }

    pub fn current_session_title(&self) -> Option<&str> {
        let id = self.session.id.as_deref()?;
        self.sessions
            .iter()
            .find(|summary| summary.session_id == id)
            .map(SessionSummary::display_title)
    }
}
