use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::api::client::ApiError;
use crate::api::{
    ChatStreamRequest, ConversationResponse, Credentials, DateRangeRequest, ModelsResponse,
    SessionSummary, UserInfo,
};

pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Identifies the signed-in user on every backend call.
///
/// Passed explicitly instead of living in an ambient cookie jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn cookie_header(&self) -> String {
        format!("user_id={}", self.user_id)
    }
}

/// An image ready for upload.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// The chat portal endpoints the client depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<SessionContext, ApiError>;

    async fn register(&self, credentials: &Credentials) -> Result<(), ApiError>;

    async fn models(&self, context: &SessionContext) -> Result<ModelsResponse, ApiError>;

    async fn user_info(&self, context: &SessionContext) -> Result<UserInfo, ApiError>;

    /// Returns the avatar reference the server stored.
    async fn upload_avatar(
        &self,
        context: &SessionContext,
        upload: AvatarUpload,
    ) -> Result<String, ApiError>;

    /// Resolves once response headers arrive; the body is streamed.
    async fn open_chat_stream(
        &self,
        context: &SessionContext,
        request: &ChatStreamRequest,
    ) -> Result<ByteStream, ApiError>;

    async fn sessions(&self, context: &SessionContext) -> Result<Vec<SessionSummary>, ApiError>;

    async fn conversation(
        &self,
        context: &SessionContext,
        session_id: &str,
    ) -> Result<ConversationResponse, ApiError>;

    async fn sessions_in_range(
        &self,
        context: &SessionContext,
        range: &DateRangeRequest,
    ) -> Result<Vec<SessionSummary>, ApiError>;

    async fn delete_session(&self, context: &SessionContext, session_id: &str)
        -> Result<(), ApiError>;
}
