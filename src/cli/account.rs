//! Sign-in, registration and profile commands.

use std::error::Error;
use std::path::Path;

use crate::api::Credentials;
use crate::cli::prompt::{prompt_line, prompt_required};
use crate::cli::Workspace;

pub async fn login(ws: &Workspace, username: Option<String>) -> Result<(), Box<dyn Error>> {
    println!("🔐 Sign in to {}", ws.base_url);
    let credentials = read_credentials(username)?;

    let controller = ws.controller();
    let context = match controller.login(&credentials).await {
        Ok(context) => context,
        Err(err) => ws.fail("Login failed", &err),
    };

    if let Err(err) = ws.credentials.store(&ws.base_url, &context) {
        eprintln!("⚠️  Logged in, but the session could not be saved: {err}");
        eprintln!(
            "💡 Export {}={} to reuse it.",
            crate::core::credentials::USER_ID_ENV,
            context.user_id
        );
        return Ok(());
    }

    let state = controller.snapshot();
    let name = state
        .user
        .as_ref()
        .map(|user| user.username.as_str())
        .unwrap_or(credentials.username.as_str());
    println!("✅ Logged in as {name}");
    if let Some(model) = state.current_model.as_deref() {
        println!("   Model: {model}");
    }
    Ok(())
}

pub async fn register(ws: &Workspace, username: Option<String>) -> Result<(), Box<dyn Error>> {
    println!("📝 Create an account on {}", ws.base_url);
    let credentials = read_credentials(username)?;
    let confirmation = prompt_line("Repeat password: ")?;
    if confirmation != credentials.password {
        eprintln!("❌ Passwords do not match");
        std::process::exit(1);
    }

    if let Err(err) = ws.controller().register(&credentials).await {
        ws.fail("Registration failed", &err);
    }
    println!("✅ Registered {}", credentials.username);
    println!("💡 Run 'chatwire login {}' to sign in.", credentials.username);
    Ok(())
}

pub fn logout(ws: &Workspace) -> Result<(), Box<dyn Error>> {
    if ws.credentials.remove(&ws.base_url)? {
        println!("✅ Logged out of {}", ws.base_url);
    } else {
        println!("ℹ️  No stored session for {}", ws.base_url);
    }
    Ok(())
}

pub async fn whoami(ws: &Workspace) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;
    let state = controller.snapshot();

    match state.user.as_ref() {
        Some(user) => {
            println!("👤 {}", user.username);
            println!("   Messages sent: {}", state.message_count);
            if !user.avatar.is_empty() {
                println!("   Avatar: {}", user.avatar);
            }
        }
        None => println!("👤 Signed in (profile unavailable)"),
    }
    println!("   Backend: {}", ws.base_url);
    match state.current_model.as_deref() {
        Some(model) => println!("   Model: {model}"),
        None => println!("   Model: (none available)"),
    }
    Ok(())
}

pub async fn avatar(ws: &Workspace, path: &Path) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;
    match controller.upload_avatar(path).await {
        Ok(url) => {
            println!("✅ Avatar updated");
            println!("   {url}");
            Ok(())
        }
        Err(err) => ws.fail("Avatar upload failed", &err),
    }
}

fn read_credentials(username: Option<String>) -> Result<Credentials, Box<dyn Error>> {
    let username = match username.filter(|name| !name.trim().is_empty()) {
        Some(name) => name.trim().to_string(),
        None => prompt_required("Username: ", "Username")?,
    };
    let password = prompt_line("Password: ")?;
    if password.is_empty() {
        eprintln!("❌ Password cannot be empty");
        std::process::exit(1);
    }
    Ok(Credentials { username, password })
}
