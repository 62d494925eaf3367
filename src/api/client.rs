use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{
    AvatarResponse, ChatStreamRequest, ConversationResponse, Credentials, DateRangeRequest,
    LoginResponse, ModelsResponse, SessionSummary, SessionsResponse, UserInfo,
};
use crate::core::backend::{AvatarUpload, ByteStream, ChatBackend, SessionContext};
use crate::utils::auth::add_session_cookie;
use crate::utils::url::construct_api_url;

/// Failures talking to the backend.
#[derive(Debug)]
pub enum ApiError {
    /// The server rejected the session cookie (HTTP 401).
    Unauthorized,
    /// The user lacks the required role (HTTP 403).
    Forbidden(String),
    /// The addressed record does not exist (HTTP 404).
    NotFound(String),
    /// Any other non-success status.
    Status { status: u16, detail: String },
    /// The request never completed.
    Transport(reqwest::Error),
    /// The request or stream exceeded its deadline.
    Timeout,
    /// Input rejected locally before any request was made.
    InvalidInput(String),
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = extract_detail(body);
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::FORBIDDEN => ApiError::Forbidden(detail),
            StatusCode::NOT_FOUND => ApiError::NotFound(detail),
            other => ApiError::Status {
                status: other.as_u16(),
                detail,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// True for failures where the request may not have reached the server.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(err)
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Not logged in or login expired"),
            ApiError::Forbidden(detail) => write!(f, "Permission denied: {detail}"),
            ApiError::NotFound(detail) => write!(f, "Not found: {detail}"),
            ApiError::Status { status, detail } => {
                write!(f, "Request failed with status {status}: {detail}")
            }
            ApiError::Transport(err) => write!(f, "Network error: {err}"),
            ApiError::Timeout => write!(f, "Request timed out"),
            ApiError::InvalidInput(reason) => write!(f, "{reason}"),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

/// Pull a readable reason out of an error body.
///
/// FastAPI answers `{"detail": "..."}` for handled errors and
/// `{"detail": [{"msg": ...}]}` for validation failures.
fn extract_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return trimmed.to_string();
    };

    let summary = match value.get("detail") {
        Some(serde_json::Value::String(text)) => Some(text.clone()),
        Some(serde_json::Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|msg| msg.as_str()))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
    .or_else(|| {
        value
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_owned)
    });

    summary
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| trimmed.to_string())
}

/// `ChatBackend` over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, request_timeout)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        context: Option<&SessionContext>,
    ) -> RequestBuilder {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!(%method, %url, "backend request");
        let request = self.client.request(method, url);
        match context {
            Some(context) => add_session_cookie(request, context),
            None => request,
        }
    }

    /// Send with the per-request deadline and fail on non-success statuses.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.timeout(self.request_timeout).send().await?;
        ensure_success(response).await
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(ApiError::from_status(status, &body))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<SessionContext, ApiError> {
        let request = self
            .request(reqwest::Method::POST, "api/login", None)
            .json(credentials);
        let response: LoginResponse = self.execute_json(request).await?;
        Ok(SessionContext::new(response.user_id))
    }

    async fn register(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let request = self
            .request(reqwest::Method::POST, "api/register", None)
            .json(credentials);
        self.execute(request).await?;
        Ok(())
    }

    async fn models(&self, context: &SessionContext) -> Result<ModelsResponse, ApiError> {
        let request = self.request(reqwest::Method::GET, "api/models", Some(context));
        self.execute_json(request).await
    }

    async fn user_info(&self, context: &SessionContext) -> Result<UserInfo, ApiError> {
        let request = self.request(reqwest::Method::GET, "api/user/info", Some(context));
        self.execute_json(request).await
    }

    async fn upload_avatar(
        &self,
        context: &SessionContext,
        upload: AvatarUpload,
    ) -> Result<String, ApiError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(upload.mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .request(reqwest::Method::POST, "api/user/avatar", Some(context))
            .multipart(form);
        let response: AvatarResponse = self.execute_json(request).await?;
        Ok(response.avatar)
    }

    async fn open_chat_stream(
        &self,
        context: &SessionContext,
        request: &ChatStreamRequest,
    ) -> Result<ByteStream, ApiError> {
        // No request-level timeout here: it would also cut off the body.
        let response = self
            .request(reqwest::Method::POST, "api/chat/stream", Some(context))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ApiError::from))
            .boxed())
    }

    async fn sessions(&self, context: &SessionContext) -> Result<Vec<SessionSummary>, ApiError> {
        let request = self.request(reqwest::Method::GET, "api/chat/history", Some(context));
        let response: SessionsResponse = self.execute_json(request).await?;
        Ok(response.sessions)
    }

    async fn conversation(
        &self,
        context: &SessionContext,
        session_id: &str,
    ) -> Result<ConversationResponse, ApiError> {
        let request = self
            .request(reqwest::Method::GET, "api/chat/history", Some(context))
            .query(&[("session_id", session_id)]);
        self.execute_json(request).await
    }

    async fn sessions_in_range(
        &self,
        context: &SessionContext,
        range: &DateRangeRequest,
    ) -> Result<Vec<SessionSummary>, ApiError> {
        let request = self
            .request(
                reqwest::Method::POST,
                "api/chat/history/date-range",
                Some(context),
            )
            .json(range);
        let response: SessionsResponse = self.execute_json(request).await?;
        Ok(response.sessions)
    }

    async fn delete_session(
        &self,
        context: &SessionContext,
        session_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!("api/chat/session/{session_id}");
        let request = self.request(reqwest::Method::DELETE, &endpoint, Some(context));
        self.execute(request).await?;
        Ok(())
    }
}
