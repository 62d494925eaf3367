use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::api::client::ApiError;
use crate::api::{
    ChatStreamRequest, ConversationResponse, Credentials, DateRangeRequest, ModelsResponse,
    ProviderModel, SessionSummary, UserInfo,
};
use crate::core::backend::{AvatarUpload, ByteStream, ChatBackend, SessionContext};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type CapturedRequests = Arc<Mutex<Vec<CapturedRequest>>>;

pub struct MockResponse {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl MockResponse {
    pub fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self::status(200, content_type, body)
    }

    pub fn status(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    fn render(&self) -> String {
        format!(
            "HTTP/1.1 {} Mock\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// Serve one canned response per incoming connection, in order.
pub async fn spawn_mock_server(responses: Vec<MockResponse>) -> (SocketAddr, CapturedRequests) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");
    let captured: CapturedRequests = Arc::new(Mutex::new(Vec::new()));
    let captured_for_server = Arc::clone(&captured);

    tokio::spawn(async move {
        for response in responses {
            let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
            let request = read_http_request(&mut stream).await?;
            captured_for_server.lock().await.push(request);
            stream
                .write_all(response.render().as_bytes())
                .await
                .map_err(|err| err.to_string())?;
            let _ = stream.shutdown().await;
        }
        Ok::<(), String>(())
    });

    (addr, captured)
}

/// How a scripted backend answers the next chat stream request.
pub enum StreamScript {
    /// Respond with these body chunks, as delivered by the transport.
    Chunks(Vec<&'static str>),
    /// Deliver the chunks, then fail the transport.
    ChunksThenReset(Vec<&'static str>),
    /// Deliver the chunks, then never produce another byte.
    ChunksThenHang(Vec<&'static str>),
    /// Fail before any body arrives.
    Reject(ApiError),
    /// Deliver chunks as the test sends them; the body ends when the
    /// sender is dropped.
    Fed(mpsc::UnboundedReceiver<&'static str>),
    /// Record the request but never answer it.
    NeverOpens,
}

/// In-memory `ChatBackend` driven by scripted answers.
#[derive(Default)]
pub struct ScriptedBackend {
    pub streams: std::sync::Mutex<VecDeque<StreamScript>>,
    pub sessions: std::sync::Mutex<Vec<SessionSummary>>,
    pub sessions_error: std::sync::Mutex<Option<ApiError>>,
    pub stream_requests: std::sync::Mutex<Vec<ChatStreamRequest>>,
    pub session_list_calls: std::sync::Mutex<usize>,
    pub deleted: std::sync::Mutex<Vec<String>>,
    pub user: std::sync::Mutex<UserInfo>,
    pub conversations: std::sync::Mutex<Vec<(String, ConversationResponse)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.push_stream(script);
        self
    }

    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().expect("lock").push_back(script);
    }

    pub fn set_sessions(&self, sessions: Vec<SessionSummary>) {
        *self.sessions.lock().expect("lock") = sessions;
    }

    pub fn stream_requests(&self) -> Vec<ChatStreamRequest> {
        self.stream_requests.lock().expect("lock").clone()
    }

    pub fn session_list_calls(&self) -> usize {
        *self.session_list_calls.lock().expect("lock")
    }
}

pub fn summary(session_id: &str, title: &str) -> SessionSummary {
    SessionSummary {
        session_id: session_id.to_string(),
        title: Some(title.to_string()),
        model_id: Some("test-model".to_string()),
        create_time: Some("2025-01-01T00:00:00".to_string()),
        update_time: Some("2025-01-01T00:00:00".to_string()),
        preview: Some(title.to_string()),
    }
}

fn chunk_stream(chunks: Vec<&'static str>) -> impl futures_util::Stream<Item = Result<Bytes, ApiError>> {
    futures_util::stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
    )
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn login(&self, credentials: &Credentials) -> Result<SessionContext, ApiError> {
        if credentials.password == "wrong" {
            return Err(ApiError::Unauthorized);
        }
        Ok(SessionContext::new("1"))
    }

    async fn register(&self, _credentials: &Credentials) -> Result<(), ApiError> {
        Ok(())
    }

    async fn models(&self, _context: &SessionContext) -> Result<ModelsResponse, ApiError> {
        let mut providers = std::collections::BTreeMap::new();
        providers.insert(
            "Test".to_string(),
            vec![ProviderModel {
                model_id: "test-model".into(),
                model_name: "Test Model".into(),
            }],
        );
        Ok(ModelsResponse {
            models: vec!["test-model".into()],
            providers,
        })
    }

    async fn user_info(&self, _context: &SessionContext) -> Result<UserInfo, ApiError> {
        Ok(self.user.lock().expect("lock").clone())
    }

    async fn upload_avatar(
        &self,
        _context: &SessionContext,
        upload: AvatarUpload,
    ) -> Result<String, ApiError> {
        Ok(format!("/static/avatars/{}", upload.file_name))
    }

    async fn open_chat_stream(
        &self,
        _context: &SessionContext,
        request: &ChatStreamRequest,
    ) -> Result<ByteStream, ApiError> {
        self.stream_requests
            .lock()
            .expect("lock")
            .push(request.clone());
        let script = self
            .streams
            .lock()
            .expect("lock")
            .pop_front()
            .expect("no scripted stream left");
        match script {
            StreamScript::Chunks(chunks) => Ok(chunk_stream(chunks).boxed()),
            StreamScript::ChunksThenReset(chunks) => Ok(chunk_stream(chunks)
                .chain(futures_util::stream::once(async { Err(ApiError::Timeout) }))
                .boxed()),
            StreamScript::ChunksThenHang(chunks) => Ok(chunk_stream(chunks)
                .chain(futures_util::stream::pending())
                .boxed()),
            StreamScript::Reject(err) => Err(err),
            StreamScript::Fed(chunks) => Ok(futures_util::stream::unfold(
                chunks,
                |mut chunks| async move {
                    let chunk = chunks.recv().await?;
                    Some((Ok(Bytes::from_static(chunk.as_bytes())), chunks))
                },
            )
            .boxed()),
            StreamScript::NeverOpens => std::future::pending().await,
        }
    }

    async fn sessions(&self, _context: &SessionContext) -> Result<Vec<SessionSummary>, ApiError> {
        *self.session_list_calls.lock().expect("lock") += 1;
        if let Some(err) = self.sessions_error.lock().expect("lock").take() {
            return Err(err);
        }
        Ok(self.sessions.lock().expect("lock").clone())
    }

    async fn conversation(
        &self,
        _context: &SessionContext,
        session_id: &str,
    ) -> Result<ConversationResponse, ApiError> {
        let conversations = self.conversations.lock().expect("lock");
        let index = conversations
            .iter()
            .position(|(id, _)| id == session_id)
            .ok_or_else(|| ApiError::NotFound(session_id.to_string()))?;
        let (_, found) = &conversations[index];
        Ok(ConversationResponse {
            conversation: found.conversation.clone(),
            model_id: found.model_id.clone(),
            create_time: found.create_time.clone(),
        })
    }

    async fn sessions_in_range(
        &self,
        _context: &SessionContext,
        range: &DateRangeRequest,
    ) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self.sessions.lock().expect("lock").clone();
        Ok(sessions
            .into_iter()
            .filter(|summary| {
                summary
                    .create_time
                    .as_deref()
                    .is_some_and(|created| {
                        created >= range.start_time.as_str() && created <= range.end_time.as_str()
                    })
            })
            .collect())
    }

    async fn delete_session(
        &self,
        _context: &SessionContext,
        session_id: &str,
    ) -> Result<(), ApiError> {
        let mut sessions = self.sessions.lock().expect("lock");
        let before = sessions.len();
        sessions.retain(|summary| summary.session_id != session_id);
        if sessions.len() == before {
            return Err(ApiError::NotFound(session_id.to_string()));
        }
        self.deleted
            .lock()
            .expect("lock")
            .push(session_id.to_string());
        Ok(())
    }
}
