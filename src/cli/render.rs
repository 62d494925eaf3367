//! Terminal output for streamed replies and notices.

use std::io::{self, Write};

use chrono::Local;

use crate::core::backend::ChatBackend;
use crate::core::client::{ChatController, SendOutcome};
use crate::core::message::{Message, Role};
use crate::core::state::{ChatState, Notice, NoticeKind};

/// Tracks how much of the streaming reply has reached the terminal.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    index: usize,
    printed: usize,
}

impl ReplyPrinter {
    /// Follow the reply that will be placed after `base_len` existing
    /// messages and the user's new one.
    pub fn after(base_len: usize) -> Self {
        Self {
            index: base_len + 1,
            printed: 0,
        }
    }

    /// Text of the reply not yet printed.
    pub fn pending<'a>(&mut self, state: &'a ChatState) -> Option<&'a str> {
        let reply = state
            .session
            .messages
            .get(self.index)
            .filter(|message| message.role == Role::Assistant)?;
        let fresh = reply.content.get(self.printed..)?;
        if fresh.is_empty() {
            return None;
        }
        self.printed = reply.content.len();
        Some(fresh)
    }

    pub fn printed_any(&self) -> bool {
        self.printed > 0
    }
}

/// Send `text` and echo the reply to stdout while it streams.
pub async fn send_and_print<B: ChatBackend>(
    controller: &ChatController<B>,
    text: String,
) -> io::Result<SendOutcome> {
    let mut rx = controller.subscribe();
    let mut printer = ReplyPrinter::after(rx.borrow_and_update().session.messages.len());
    let mut stdout = io::stdout();

    let send = controller.submit(text);
    tokio::pin!(send);
    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            changed = rx.changed() => {
                if changed.is_err() {
                    break (&mut send).await;
                }
                let state = rx.borrow_and_update();
                if let Some(fresh) = printer.pending(&state) {
                    write!(stdout, "{fresh}")?;
                    stdout.flush()?;
                }
            }
        }
    };

    if let Some(fresh) = printer.pending(&controller.snapshot()) {
        write!(stdout, "{fresh}")?;
    }
    if printer.printed_any() {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(outcome)
}

pub fn notice_prefix(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Info => "ℹ️ ",
        NoticeKind::Success => "✅",
        NoticeKind::Warning => "⚠️ ",
        NoticeKind::Error => "❌",
    }
}

pub fn print_notices(notices: &[Notice]) {
    for notice in notices {
        eprintln!("{} {}", notice_prefix(notice.kind), notice.text);
    }
}

/// Print a stored conversation, one block per message.
pub fn print_transcript(messages: &[Message], user_label: &str) {
    for message in messages {
        let time = message.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        match message.role {
            Role::User => println!("🧑 {user_label} [{time}]"),
            Role::Assistant => println!("🤖 Assistant [{time}]"),
        }
        println!("{}", message.content);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_reply(reply: &str) -> ChatState {
        let mut state = ChatState::default();
        state.session.push(Message::user("earlier"));
        state.session.push(Message::assistant("earlier reply"));
        state.session.push(Message::user("hi"));
        let mut message = Message::assistant_placeholder();
        message.content = reply.to_string();
        state.session.push(message);
        state
    }

    #[test]
    fn prints_only_new_text() {
        let mut printer = ReplyPrinter::after(2);

        assert_eq!(printer.pending(&state_with_reply("")), None);
        assert_eq!(printer.pending(&state_with_reply("Hé")), Some("Hé"));
        assert_eq!(printer.pending(&state_with_reply("Hé")), None);
        assert_eq!(printer.pending(&state_with_reply("Héllo!")), Some("llo!"));
        assert!(printer.printed_any());
    }

    #[test]
    fn ignores_rolled_back_reply() {
        let mut printer = ReplyPrinter::after(2);
        let mut state = state_with_reply("Par");
        assert_eq!(printer.pending(&state), Some("Par"));

        state.session.messages.truncate(2);
        assert_eq!(printer.pending(&state), None);
    }
}
