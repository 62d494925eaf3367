//! Model and conversation listing commands.

use std::error::Error;

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::api::SessionSummary;
use crate::cli::prompt::{confirm, ConfirmationChoice};
use crate::cli::render::print_transcript;
use crate::cli::Workspace;

const RANGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EARLIEST: &str = "1970-01-01 00:00:00";

pub async fn list_models(ws: &Workspace) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;
    let state = controller.snapshot();
    let catalog = &state.catalog;

    println!("🤖 Available Models on {}", ws.base_url);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if catalog.is_empty() {
        println!("No models are configured on this backend.");
        println!("💡 An administrator can add one with 'chatwire admin add-model'.");
        return Ok(());
    }

    let current = state.current_model.as_deref();
    let marker = |model_id: &str| {
        if Some(model_id) == current {
            "  ⭐"
        } else {
            ""
        }
    };

    if catalog.providers.is_empty() {
        for model in &catalog.models {
            println!("  • {model}{}", marker(model.as_str()));
        }
    } else {
        for (provider, models) in &catalog.providers {
            println!("{provider}");
            for model in models {
                println!(
                    "  • {} ({}){}",
                    model.model_id,
                    model.model_name,
                    marker(model.model_id.as_str())
                );
            }
            println!();
        }
    }

    if let Some(default_model) = ws.config.default_model.as_deref() {
        if !catalog.contains(default_model) {
            println!("⚠️  Configured default model '{default_model}' is not offered here");
        }
    }
    Ok(())
}

pub async fn list_sessions(
    ws: &Workspace,
    from: Option<String>,
    to: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;

    let filtered = from.is_some() || to.is_some();
    if filtered {
        let start = match from.as_deref() {
            Some(input) => expand_range_bound(input, false),
            None => Ok(EARLIEST.to_string()),
        };
        let end = match to.as_deref() {
            Some(input) => expand_range_bound(input, true),
            None => Ok(Local::now().format(RANGE_FORMAT).to_string()),
        };
        let (start, end) = match (start, end) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(reason), _) | (_, Err(reason)) => {
                eprintln!("❌ {reason}");
                eprintln!("💡 Use YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]");
                std::process::exit(1);
            }
        };
        if let Err(err) = controller.search_sessions(&start, &end).await {
            ws.fail("Search failed", &err);
        }
        println!("📅 Conversations created {start} to {end}");
    } else {
        println!("💬 Conversations");
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state = controller.snapshot();
    if state.sessions.is_empty() {
        if filtered {
            println!("No conversations found in this time range.");
        } else {
            println!("No conversations yet. Start one with 'chatwire chat'.");
        }
        return Ok(());
    }
    for summary in &state.sessions {
        print_summary(summary);
    }
    println!();
    println!("💡 Continue one with 'chatwire chat -s <id>'.");
    Ok(())
}

pub async fn show_session(ws: &Workspace, session_id: &str) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;
    if let Err(err) = controller.open_session(session_id).await {
        ws.fail("Failed to load conversation", &err);
    }

    let state = controller.snapshot();
    let title = state.current_session_title().unwrap_or(session_id);
    println!("💬 {title}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    if state.session.messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    let user_label = state
        .user
        .as_ref()
        .map(|user| user.username.clone())
        .unwrap_or_else(|| "You".to_string());
    print_transcript(&state.session.messages, &user_label);
    Ok(())
}

pub async fn delete_session(
    ws: &Workspace,
    session_id: &str,
    yes: bool,
) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;

    if !yes {
        let title = controller
            .snapshot()
            .sessions
            .iter()
            .find(|summary| summary.session_id == session_id)
            .map(|summary| summary.display_title().to_string());
        let question = match title {
            Some(title) => format!("Delete conversation \"{title}\"?"),
            None => format!("Delete conversation {session_id}?"),
        };
        if confirm(&question)? != ConfirmationChoice::Yes {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if let Err(err) = controller.delete_session(session_id).await {
        ws.fail("Delete failed", &err);
    }
    println!("✅ Conversation deleted");
    Ok(())
}

pub fn print_summary(summary: &SessionSummary) {
    let updated = summary
        .update_time
        .as_deref()
        .or(summary.create_time.as_deref())
        .unwrap_or("-");
    println!("  {}  {updated}", summary.session_id);
    println!("      {}", summary.display_title());
    if let Some(model) = summary.model_id.as_deref() {
        println!("      model: {model}");
    }
}

/// Normalize a `--from`/`--to` value to `YYYY-MM-DD HH:MM:SS`.
///
/// A bare date covers the whole day: it starts at midnight for a lower
/// bound and ends at 23:59:59 for an upper one.
pub fn expand_range_bound(input: &str, end: bool) -> Result<String, String> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let time = if end {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        return time
            .map(|time| time.format(RANGE_FORMAT).to_string())
            .ok_or_else(|| format!("Invalid date: {input}"));
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|time| time.format(RANGE_FORMAT).to_string())
        .ok_or_else(|| format!("Invalid date or time: {input}"))
}
