//! Admin console endpoints.
//!
//! Every call requires a session whose user carries the admin flag; the
//! backend answers 401 without a session and 403 for ordinary users.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::client::{ApiError, HttpBackend};
use crate::api::MessageResponse;
use crate::core::backend::SessionContext;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminCheck {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub create_time: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub description: Option<String>,
}

/// Provider edit; a missing `api_key` keeps the stored key.
#[derive(Serialize, Debug, Clone)]
pub struct ProviderUpdate {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    pub id: i64,
    pub model_id: String,
    pub model_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub provider_name: Option<String>,
    pub provider_id: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct ModelConfigInput {
    pub provider_id: i64,
    pub model_id: String,
    pub model_name: String,
    pub description: Option<String>,
    pub max_tokens: Option<i64>,
    pub sort_order: Option<i64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub is_admin: i64,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub message_count: u64,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin == 1
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub status: i64,
    pub is_admin: i64,
}

#[derive(Deserialize)]
struct ProvidersResponse {
    #[serde(default)]
    providers: Vec<ProviderRecord>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelRecord>,
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Admin operations on behalf of one signed-in user.
#[derive(Clone)]
pub struct AdminClient {
    http: HttpBackend,
    context: SessionContext,
}

impl AdminClient {
    pub fn new(http: HttpBackend, context: SessionContext) -> Self {
        Self { http, context }
    }

    pub async fn check(&self) -> Result<AdminCheck, ApiError> {
        self.get("api/admin/check").await
    }

    pub async fn providers(&self) -> Result<Vec<ProviderRecord>, ApiError> {
        let response: ProvidersResponse = self.get("api/admin/providers").await?;
        Ok(response.providers)
    }

    pub async fn create_provider(&self, provider: &NewProvider) -> Result<String, ApiError> {
        require_fields(&[
            ("name", &provider.name),
            ("base_url", &provider.base_url),
            ("api_key", &provider.api_key),
        ])?;
        self.send_json(Method::POST, "api/admin/providers", provider)
            .await
    }

    pub async fn update_provider(
        &self,
        provider_id: i64,
        update: &ProviderUpdate,
    ) -> Result<String, ApiError> {
        require_fields(&[("name", &update.name), ("base_url", &update.base_url)])?;
        let endpoint = format!("api/admin/providers/{provider_id}");
        self.send_json(Method::PUT, &endpoint, update).await
    }

    pub async fn delete_provider(&self, provider_id: i64) -> Result<String, ApiError> {
        self.delete(&format!("api/admin/providers/{provider_id}"))
            .await
    }

    pub async fn models(&self) -> Result<Vec<ModelRecord>, ApiError> {
        let response: ModelsResponse = self.get("api/admin/models").await?;
        Ok(response.models)
    }

    pub async fn create_model(&self, model: &ModelConfigInput) -> Result<String, ApiError> {
        require_fields(&[("model_id", &model.model_id), ("model_name", &model.model_name)])?;
        self.send_json(Method::POST, "api/admin/models", model).await
    }

    pub async fn update_model(
        &self,
        record_id: i64,
        model: &ModelConfigInput,
    ) -> Result<String, ApiError> {
        require_fields(&[("model_id", &model.model_id), ("model_name", &model.model_name)])?;
        let endpoint = format!("api/admin/models/{record_id}");
        self.send_json(Method::PUT, &endpoint, model).await
    }

    pub async fn delete_model(&self, record_id: i64) -> Result<String, ApiError> {
        self.delete(&format!("api/admin/models/{record_id}")).await
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>, ApiError> {
        let response: UsersResponse = self.get("api/admin/users").await?;
        Ok(response.users)
    }

    pub async fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<String, ApiError> {
        let endpoint = format!("api/admin/users/{user_id}");
        self.send_json(Method::PUT, &endpoint, update).await
    }

    /// The backend refuses to delete the caller's own account.
    pub async fn delete_user(&self, user_id: i64) -> Result<String, ApiError> {
        self.delete(&format!("api/admin/users/{user_id}")).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let request = self.http.request(Method::GET, endpoint, Some(&self.context));
        self.http.execute_json(request).await
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<String, ApiError> {
        let request = self
            .http
            .request(method, endpoint, Some(&self.context))
            .json(body);
        let response: MessageResponse = self.http.execute_json(request).await?;
        Ok(response.message.unwrap_or_default())
    }

    async fn delete(&self, endpoint: &str) -> Result<String, ApiError> {
        let request = self
            .http
            .request(Method::DELETE, endpoint, Some(&self.context));
        let response: MessageResponse = self.http.execute_json(request).await?;
        Ok(response.message.unwrap_or_default())
    }
}

fn require_fields(fields: &[(&str, &String)]) -> Result<(), ApiError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::InvalidInput(format!(
            "Required fields are empty: {}",
            missing.join(", ")
        )))
    }
}
