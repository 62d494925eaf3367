//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod account;
pub mod admin;
pub mod chat;
pub mod prompt;
pub mod render;
pub mod say;
pub mod sessions;
pub mod settings;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::client::{ApiError, HttpBackend};
use crate::cli::admin::AdminCommand;
use crate::cli::settings::{SetContext, SettingRegistry};
use crate::core::client::{ChatController, ClientError};
use crate::core::config::data::{path_display, Config};
use crate::core::credentials::CredentialStore;

/// Environment variable overriding the configured backend URL.
pub const BASE_URL_ENV: &str = "CHATWIRE_BASE_URL";

#[derive(Parser)]
#[command(name = "chatwire")]
#[command(version)]
#[command(about = "Command-line client for a multi-model chat portal")]
#[command(
    long_about = "chatwire talks to a chat portal backend: it signs in, lists models and \
conversations, and streams replies to the terminal as they are generated.\n\n\
Authentication:\n\
  Use 'chatwire login' once; the session is stored in your system keyring.\n\n\
Environment Variables:\n\
  CHATWIRE_BASE_URL   Backend URL (overrides the config file)\n\
  CHATWIRE_USER_ID    Session user id (bypasses the keyring)\n\
  RUST_LOG            Diagnostic log filter (e.g. chatwire=debug)\n\n\
Chat commands:\n\
  /new              Start a new conversation\n\
  /sessions         List conversations\n\
  /open <id>        Continue a stored conversation\n\
  /delete <id>      Delete a conversation\n\
  /model [id]       Show or switch the model\n\
  /log <filename>   Enable logging to specified file\n\
  /log              Toggle logging pause/resume\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend URL for this invocation
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Show debug diagnostics on stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Enable transcript logging to specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and remember the session
    Login {
        /// Account name (prompted when omitted)
        username: Option<String>,
    },
    /// Create an account
    Register {
        /// Account name (prompted when omitted)
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List the models the backend offers
    Models,
    /// List conversations, optionally limited to a creation date range
    Sessions {
        /// Earliest creation time (YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS])
        #[arg(long)]
        from: Option<String>,
        /// Latest creation time (YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS])
        #[arg(long)]
        to: Option<String>,
    },
    /// Print a stored conversation
    Show {
        session_id: String,
    },
    /// Delete a stored conversation
    Delete {
        session_id: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Send one message and print the reply
    Say {
        /// Continue this conversation instead of starting a new one
        #[arg(short = 's', long)]
        session: Option<String>,
        /// Model to answer with
        #[arg(short = 'm', long)]
        model: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Start an interactive chat (default)
    Chat {
        /// Continue this conversation instead of starting a new one
        #[arg(short = 's', long)]
        session: Option<String>,
        /// Model to answer with
        #[arg(short = 'm', long)]
        model: Option<String>,
    },
    /// Upload a new avatar image (max 2MB)
    Avatar {
        path: PathBuf,
    },
    /// Administer providers, models and users
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    /// Show the current configuration
    Config,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

/// Diagnostics go to stderr so replies on stdout stay clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "chatwire=debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn async_main(mut args: Args) -> Result<(), Box<dyn Error>> {
    let command = args.command.take().unwrap_or(Commands::Chat {
        session: None,
        model: None,
    });

    match command {
        Commands::Config => {
            let config_path = Config::get_config_path()?;
            let config = Config::load_from_path(&config_path)?;
            config.print_all();
            println!("  (file: {})", path_display(&config_path));
            Ok(())
        }
        Commands::Set { key, value } => {
            let config_path = Config::get_config_path()?;
            let Some(key) = key else {
                let config = Config::load_from_path(&config_path)?;
                println!("Available settings:");
                for line in SettingRegistry::new().describe(&config) {
                    println!("{line}");
                }
                return Ok(());
            };
            let ctx = SetContext {
                config_path: &config_path,
            };
            match settings::run_set(&key, &value, &ctx) {
                Ok(message) => println!("{message}"),
                Err(err) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let config_path = Config::get_config_path()?;
            let ctx = SetContext {
                config_path: &config_path,
            };
            match settings::run_unset(&key, &ctx) {
                Ok(message) => println!("{message}"),
                Err(err) => {
                    err.print();
                    std::process::exit(err.exit_code());
                }
            }
            Ok(())
        }
        Commands::Login { username } => account::login(&remote(&args)?, username).await,
        Commands::Register { username } => account::register(&remote(&args)?, username).await,
        Commands::Logout => account::logout(&remote(&args)?),
        Commands::Whoami => account::whoami(&remote(&args)?).await,
        Commands::Avatar { path } => account::avatar(&remote(&args)?, &path).await,
        Commands::Models => sessions::list_models(&remote(&args)?).await,
        Commands::Sessions { from, to } => {
            sessions::list_sessions(&remote(&args)?, from, to).await
        }
        Commands::Show { session_id } => {
            sessions::show_session(&remote(&args)?, &session_id).await
        }
        Commands::Delete { session_id, yes } => {
            sessions::delete_session(&remote(&args)?, &session_id, yes).await
        }
        Commands::Say {
            session,
            model,
            prompt,
        } => say::run_say(&remote(&args)?, prompt, session, model, args.log.clone()).await,
        Commands::Chat { session, model } => {
            chat::run_chat(&remote(&args)?, session, model, args.log.clone()).await
        }
        Commands::Admin { command } => admin::run_admin(&remote(&args)?, command).await,
    }
}

fn remote(args: &Args) -> Result<Workspace, Box<dyn Error>> {
    let workspace = Workspace::load(args.base_url.as_deref())?;
    debug!(base_url = %workspace.base_url, "using backend");
    Ok(workspace)
}

/// Resolved configuration for commands that talk to the backend.
pub struct Workspace {
    pub config: Config,
    pub base_url: String,
    pub credentials: CredentialStore,
}

impl Workspace {
    /// Backend URL precedence: `--base-url`, then `CHATWIRE_BASE_URL`, then
    /// the config file.
    pub fn load(base_url_flag: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let env_url = std::env::var(BASE_URL_ENV).ok();
        let base_url = config.resolve_base_url(base_url_flag.or(env_url.as_deref()));
        Ok(Self {
            config,
            base_url,
            credentials: CredentialStore::new(),
        })
    }

    pub fn http(&self) -> HttpBackend {
        HttpBackend::new(self.base_url.clone(), self.config.request_timeout())
    }

    pub fn controller(&self) -> ChatController<HttpBackend> {
        ChatController::new(self.http(), self.config.client_settings())
    }

    /// A controller signed in with the stored session, or exit with a hint.
    pub async fn signed_in(&self) -> Result<ChatController<HttpBackend>, Box<dyn Error>> {
        let Some(context) = self.credentials.load(&self.base_url)? else {
            eprintln!("❌ Not logged in to {}", self.base_url);
            eprintln!("💡 Run 'chatwire login' first.");
            std::process::exit(1);
        };

        let controller = self.controller();
        match controller.restore(context).await {
            Ok(()) => Ok(controller),
            Err(err) if err.is_unauthorized() => {
                self.forget_session();
                eprintln!("❌ Login expired, please sign in again.");
                eprintln!("💡 Run 'chatwire login'.");
                std::process::exit(1);
            }
            Err(err) => Err(Box::new(err)),
        }
    }

    /// Drop the stored session after the backend rejected it.
    pub fn forget_session(&self) {
        if let Err(err) = self.credentials.remove(&self.base_url) {
            debug!(error = %err, "could not remove stored session");
        }
    }

    /// Report a failed command and exit.
    pub fn fail(&self, action: &str, err: &ClientError) -> ! {
        if err.is_unauthorized() {
            self.forget_session();
            eprintln!("❌ Login expired, please sign in again.");
            eprintln!("💡 Run 'chatwire login'.");
        } else if matches!(err, ClientError::Api(ApiError::Forbidden(_))) {
            eprintln!("❌ {action}: {err}");
            eprintln!("💡 This command needs an administrator account.");
        } else {
            eprintln!("❌ {action}: {err}");
        }
        std::process::exit(1);
    }
}
