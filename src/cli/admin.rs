//! `chatwire admin ...` commands.

use std::error::Error;

use clap::Subcommand;

use crate::api::admin::{
    AdminClient, ModelConfigInput, NewProvider, ProviderUpdate, UserUpdate,
};
use crate::api::client::ApiError;
use crate::cli::Workspace;
use crate::core::client::ClientError;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Verify the signed-in account has admin rights
    Check,
    /// List model providers
    Providers,
    /// List configured models
    Models,
    /// List user accounts
    Users,
    /// Register a model provider
    AddProvider {
        #[arg(long)]
        name: String,
        /// Provider API endpoint (distinct from the global --base-url)
        #[arg(long = "url")]
        base_url: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Edit a provider; the stored API key is kept unless --api-key is given
    UpdateProvider {
        id: i64,
        #[arg(long)]
        name: String,
        /// Provider API endpoint (distinct from the global --base-url)
        #[arg(long = "url")]
        base_url: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a provider
    DeleteProvider { id: i64 },
    /// Add a model to a provider
    AddModel {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Edit a model
    UpdateModel {
        id: i64,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Delete a model
    DeleteModel { id: i64 },
    /// Edit a user account
    UpdateUser {
        id: i64,
        #[arg(long)]
        username: String,
        /// 1 = active, 0 = disabled
        #[arg(long, default_value_t = 1)]
        status: i64,
        /// Grant admin rights
        #[arg(long)]
        admin: bool,
    },
    /// Delete a user account
    DeleteUser { id: i64 },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct ModelArgs {
    #[arg(long)]
    pub provider_id: i64,
    #[arg(long)]
    pub model_id: String,
    #[arg(long)]
    pub model_name: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub max_tokens: Option<i64>,
    #[arg(long)]
    pub sort_order: Option<i64>,
}

impl From<ModelArgs> for ModelConfigInput {
    fn from(args: ModelArgs) -> Self {
        ModelConfigInput {
            provider_id: args.provider_id,
            model_id: args.model_id,
            model_name: args.model_name,
            description: args.description,
            max_tokens: args.max_tokens,
            sort_order: args.sort_order,
        }
    }
}

pub async fn run_admin(ws: &Workspace, command: AdminCommand) -> Result<(), Box<dyn Error>> {
    let controller = ws.signed_in().await?;
    let Some(context) = controller.context() else {
        ws.fail("Admin", &ClientError::NotLoggedIn);
    };
    let admin = AdminClient::new(ws.http(), context);

    match run(&admin, command).await {
        Ok(()) => Ok(()),
        Err(err) => ws.fail("Admin request failed", &ClientError::Api(err)),
    }
}

async fn run(admin: &AdminClient, command: AdminCommand) -> Result<(), ApiError> {
    match command {
        AdminCommand::Check => {
            let check = admin.check().await?;
            println!("✅ {} is an administrator", check.user);
        }
        AdminCommand::Providers => {
            let providers = admin.providers().await?;
            println!("🔌 Providers");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            if providers.is_empty() {
                println!("No providers configured.");
            }
            for provider in providers {
                println!(
                    "  [{}] {}  {}{}",
                    provider.id,
                    provider.name,
                    provider.base_url,
                    disabled_suffix(provider.status)
                );
                if let Some(description) = provider.description.filter(|d| !d.is_empty()) {
                    println!("      {description}");
                }
            }
        }
        AdminCommand::Models => {
            let models = admin.models().await?;
            println!("🤖 Models");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            if models.is_empty() {
                println!("No models configured.");
            }
            for model in models {
                let provider = model
                    .provider_name
                    .unwrap_or_else(|| format!("provider {}", model.provider_id));
                println!(
                    "  [{}] {} ({}) via {provider}{}",
                    model.id,
                    model.model_id,
                    model.model_name,
                    disabled_suffix(model.status)
                );
                if let Some(max_tokens) = model.max_tokens {
                    println!("      max tokens: {max_tokens}, order: {}", model.sort_order);
                }
            }
        }
        AdminCommand::Users => {
            let users = admin.users().await?;
            println!("👥 Users");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            for user in users {
                let role = if user.is_admin() { "admin" } else { "user" };
                let state = if user.is_active() { "active" } else { "disabled" };
                println!(
                    "  [{}] {}  {role}, {state}, {} messages",
                    user.id, user.username, user.message_count
                );
                if let Some(last_login) = user.last_login.as_deref() {
                    println!("      last login: {last_login}");
                }
            }
        }
        AdminCommand::AddProvider {
            name,
            base_url,
            api_key,
            description,
        } => {
            let provider = NewProvider {
                name,
                base_url,
                api_key,
                description,
            };
            done(admin.create_provider(&provider).await?, "Provider added");
        }
        AdminCommand::UpdateProvider {
            id,
            name,
            base_url,
            api_key,
            description,
        } => {
            let update = ProviderUpdate {
                name,
                base_url,
                api_key: api_key.filter(|key| !key.trim().is_empty()),
                description,
            };
            done(admin.update_provider(id, &update).await?, "Provider updated");
        }
        AdminCommand::DeleteProvider { id } => {
            done(admin.delete_provider(id).await?, "Provider deleted");
        }
        AdminCommand::AddModel { model } => {
            done(admin.create_model(&model.into()).await?, "Model added");
        }
        AdminCommand::UpdateModel { id, model } => {
            done(admin.update_model(id, &model.into()).await?, "Model updated");
        }
        AdminCommand::DeleteModel { id } => {
            done(admin.delete_model(id).await?, "Model deleted");
        }
        AdminCommand::UpdateUser {
            id,
            username,
            status,
            admin: is_admin,
        } => {
            let update = UserUpdate {
                username,
                status,
                is_admin: i64::from(is_admin),
            };
            done(admin.update_user(id, &update).await?, "User updated");
        }
        AdminCommand::DeleteUser { id } => {
            done(admin.delete_user(id).await?, "User deleted");
        }
    }
    Ok(())
}

fn done(server_message: String, fallback: &str) {
    if server_message.is_empty() {
        println!("✅ {fallback}");
    } else {
        println!("✅ {server_message}");
    }
}

fn disabled_suffix(status: i64) -> &'static str {
    if status == 1 {
        ""
    } else {
        "  (disabled)"
    }
}
