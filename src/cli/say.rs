//! One-shot "say" command

use std::error::Error;
use std::path::PathBuf;

use crate::cli::chat::record_exchange;
use crate::cli::render::send_and_print;
use crate::cli::Workspace;
use crate::core::client::SendOutcome;
use crate::utils::logging::LoggingState;

pub async fn run_say(
    ws: &Workspace,
    prompt: Vec<String>,
    session: Option<String>,
    model: Option<String>,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: chatwire say <prompt>");
        std::process::exit(1);
    }
    let logging = LoggingState::new(log)?;

    let controller = ws.signed_in().await?;
    if let Some(session_id) = session.as_deref() {
        if let Err(err) = controller.open_session(session_id).await {
            ws.fail("Failed to load conversation", &err);
        }
    }
    if let Some(model_id) = model.as_deref() {
        if let Err(err) = controller.select_model(model_id) {
            eprintln!("❌ {err}");
            eprintln!("💡 Run 'chatwire models' to see what this backend offers.");
            std::process::exit(1);
        }
    }

    let base_len = controller.snapshot().session.messages.len();
    let outcome = send_and_print(&controller, prompt).await?;
    if matches!(
        outcome,
        SendOutcome::Completed { .. } | SendOutcome::ContentError(_) | SendOutcome::Incomplete
    ) {
        record_exchange(&logging, &controller.snapshot(), base_len);
    }

    match outcome {
        SendOutcome::Completed { session_id } => {
            if session.is_none() && !session_id.is_empty() {
                eprintln!("💡 Continue with 'chatwire say -s {session_id} ...'");
            }
            Ok(())
        }
        SendOutcome::Incomplete => {
            eprintln!("⚠️  The reply ended before the server confirmed it");
            Ok(())
        }
        SendOutcome::ContentError(message) => {
            eprintln!("❌ Error: AI reply failed: {message}");
            std::process::exit(1);
        }
        SendOutcome::NetworkFailure(reason) => {
            eprintln!("❌ Error: Failed to send message: {reason}");
            std::process::exit(1);
        }
        SendOutcome::Unauthorized => {
            ws.forget_session();
            eprintln!("❌ Login expired, please sign in again.");
            eprintln!("💡 Run 'chatwire login'.");
            std::process::exit(1);
        }
        SendOutcome::Dropped => {
            let reason = controller
                .take_notices()
                .pop()
                .map(|notice| notice.text)
                .unwrap_or_else(|| "Message was not sent".to_string());
            eprintln!("❌ Error: {reason}");
            std::process::exit(1);
        }
    }
}
