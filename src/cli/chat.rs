//! Interactive chat loop.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::client::HttpBackend;
use crate::cli::render::{print_notices, print_transcript, send_and_print};
use crate::cli::sessions::print_summary;
use crate::cli::Workspace;
use crate::core::client::{ChatController, SendOutcome};
use crate::core::state::ChatState;
use crate::utils::logging::LoggingState;

const HELP: &[(&str, &str)] = &[
    ("/new", "Start a new conversation"),
    ("/sessions", "List conversations"),
    ("/open <id>", "Continue a stored conversation"),
    ("/delete <id>", "Delete a conversation"),
    ("/model [id]", "Show or switch the model"),
    ("/log <filename>", "Enable logging to specified file"),
    ("/log", "Toggle logging pause/resume"),
    ("/help", "Show this list"),
    ("/quit", "Leave the chat"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    ProcessAsMessage(String),
    NewChat,
    ListSessions,
    Open(String),
    Delete(String),
    Model(Option<String>),
    Log(Option<String>),
    Help,
    Quit,
    Usage(&'static str),
}

/// Interpret one input line. Unknown slash commands are sent as text.
pub fn process_input(input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };
    let mut parts = rest.splitn(2, ' ');
    let command_name = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim();
    let arg = (!args.is_empty()).then(|| args.to_string());

    match command_name {
        "new" => CommandResult::NewChat,
        "sessions" => CommandResult::ListSessions,
        "open" => arg.map_or(CommandResult::Usage("/open <id>"), CommandResult::Open),
        "delete" => arg.map_or(CommandResult::Usage("/delete <id>"), CommandResult::Delete),
        "model" => CommandResult::Model(arg),
        "log" => CommandResult::Log(arg),
        "help" => CommandResult::Help,
        "quit" | "exit" => CommandResult::Quit,
        _ => CommandResult::ProcessAsMessage(input.to_string()),
    }
}

pub async fn run_chat(
    ws: &Workspace,
    session: Option<String>,
    model: Option<String>,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut logging = LoggingState::new(log)?;
    let controller = ws.signed_in().await?;

    if let Some(model_id) = model.as_deref() {
        if let Err(err) = controller.select_model(model_id) {
            eprintln!("❌ {err}");
            eprintln!("💡 Run 'chatwire models' to see what this backend offers.");
            std::process::exit(1);
        }
    }
    if let Some(session_id) = session.as_deref() {
        open(ws, &controller, &logging, session_id).await;
    }
    controller.take_notices();

    print_banner(ws, &controller.snapshot(), &logging);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match process_input(&line) {
            CommandResult::ProcessAsMessage(text) => {
                let base_len = controller.snapshot().session.messages.len();
                let outcome = send_and_print(&controller, text).await?;
                match outcome {
                    SendOutcome::Completed { .. }
                    | SendOutcome::ContentError(_)
                    | SendOutcome::Incomplete => {
                        record_exchange(&logging, &controller.snapshot(), base_len);
                    }
                    SendOutcome::Unauthorized => {
                        print_notices(&controller.take_notices());
                        ws.forget_session();
                        eprintln!("💡 Run 'chatwire login' and start the chat again.");
                        std::process::exit(1);
                    }
                    SendOutcome::Dropped | SendOutcome::NetworkFailure(_) => {}
                }
            }
            CommandResult::NewChat => {
                controller.start_new_chat();
                println!("🆕 New conversation");
            }
            CommandResult::ListSessions => {
                if controller.load_sessions().await.is_ok() {
                    let state = controller.snapshot();
                    if state.sessions.is_empty() {
                        println!("No conversations yet.");
                    }
                    for summary in &state.sessions {
                        print_summary(summary);
                    }
                }
            }
            CommandResult::Open(session_id) => {
                open(ws, &controller, &logging, &session_id).await;
            }
            CommandResult::Delete(session_id) => {
                let _ = controller.delete_session(&session_id).await;
            }
            CommandResult::Model(None) => {
                let state = controller.snapshot();
                match state.current_model.as_deref() {
                    Some(model) => println!("🤖 Model: {model}"),
                    None => println!("🤖 No model selected"),
                }
                println!("   Available: {}", state.catalog.models.join(", "));
            }
            CommandResult::Model(Some(model_id)) => match controller.select_model(&model_id) {
                Ok(()) => println!("🤖 Model: {model_id}"),
                Err(err) => eprintln!("❌ {err}"),
            },
            CommandResult::Log(Some(path)) => match logging.set_log_file(PathBuf::from(path)) {
                Ok(message) => println!("📝 {message}"),
                Err(err) => eprintln!("❌ Log error: {err}"),
            },
            CommandResult::Log(None) => match logging.toggle_logging("Logging paused") {
                Ok(message) => println!("📝 {message}"),
                Err(err) => eprintln!("❌ Log error: {err}"),
            },
            CommandResult::Help => print_help(),
            CommandResult::Usage(usage) => eprintln!("Usage: {usage}"),
            CommandResult::Quit => break,
        }

        print_notices(&controller.take_notices());
        if !controller.snapshot().is_logged_in() {
            ws.forget_session();
            eprintln!("💡 Run 'chatwire login' and start the chat again.");
            std::process::exit(1);
        }
    }

    println!("👋 Bye");
    Ok(())
}

/// Append the exchange that started after `base_len` messages.
pub fn record_exchange(logging: &LoggingState, state: &ChatState, base_len: usize) {
    let messages = &state.session.messages;
    let Some(user) = messages.get(base_len).filter(|message| message.is_user()) else {
        return;
    };
    let reply = messages
        .get(base_len + 1)
        .filter(|message| message.is_assistant());
    if let Err(err) = logging.log_exchange(&display_name(state), user, reply) {
        eprintln!("⚠️  Log error: {err}");
    }
}

async fn open(
    ws: &Workspace,
    controller: &ChatController<HttpBackend>,
    logging: &LoggingState,
    session_id: &str,
) {
    if controller.open_session(session_id).await.is_err() {
        print_notices(&controller.take_notices());
        if !controller.snapshot().is_logged_in() {
            ws.forget_session();
            std::process::exit(1);
        }
        return;
    }

    let state = controller.snapshot();
    let title = state.current_session_title().unwrap_or(session_id);
    println!("💬 {title}");
    println!();
    print_transcript(&state.session.messages, &display_name(&state));
    if let Err(err) = logging.rewrite_transcript(&state.session.messages, &display_name(&state)) {
        eprintln!("⚠️  Log error: {err}");
    }
}

fn display_name(state: &ChatState) -> String {
    state
        .user
        .as_ref()
        .map(|user| user.username.clone())
        .unwrap_or_else(|| "You".to_string())
}

fn print_banner(ws: &Workspace, state: &ChatState, logging: &LoggingState) {
    println!("🤖 chatwire {}", env!("CARGO_PKG_VERSION"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Backend: {}", ws.base_url);
    if let Some(user) = state.user.as_ref() {
        println!("   User: {} ({} messages)", user.username, state.message_count);
    }
    match state.current_model.as_deref() {
        Some(model) => println!("   Model: {model}"),
        None => println!("   Model: (none available)"),
    }
    println!("   Logging: {}", logging.get_status_string());
    println!();
    println!("💡 Type /help for commands, /quit to leave.");
    println!();
}

fn print_help() {
    for (syntax, description) in HELP {
        println!("  {syntax:<16} {description}");
    }
}
