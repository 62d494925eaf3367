//! Chat client controller.
//!
//! [`ChatController`] drives one user's interaction with the backend: sign
//! in, model and session bookkeeping, and the send/receive cycle that turns
//! a streamed response into an assistant message. All state lives in a
//! watch channel (see [`crate::core::state`]).

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::api::client::ApiError;
use crate::api::models::ModelCatalog;
use crate::api::{ChatStreamRequest, Credentials, DateRangeRequest, SessionSummary};
use crate::core::accumulator::{AssistantDraft, DraftStep};
use crate::core::backend::{AvatarUpload, ChatBackend, SessionContext};
use crate::core::message::{Message, Role};
use crate::core::session::{Binding, Session};
use crate::core::sse::EventStream;
use crate::core::state::{ChatState, NoticeKind, SendPhase};

pub const MAX_AVATAR_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Deadline for ordinary requests and for the chat stream's headers.
    pub request_timeout: Duration,
    /// Longest silence tolerated between two stream events.
    pub stream_idle_timeout: Duration,
    /// Model to select when the backend offers it.
    pub preferred_model: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(120),
            preferred_model: None,
        }
    }
}

/// How a call to [`ChatController::send`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was sent: empty input, no login, no model, or an exchange
    /// already in flight.
    Dropped,
    /// The reply finished and the session is bound to `session_id`.
    Completed { session_id: String },
    /// The server reported an error mid-reply; partial output is kept.
    ContentError(String),
    /// The stream closed without a terminal event; partial output is kept.
    Incomplete,
    /// The login was rejected; all session state has been cleared.
    Unauthorized,
    /// The exchange failed in transit and was rolled back.
    NetworkFailure(String),
}

#[derive(Debug)]
pub enum ClientError {
    NotLoggedIn,
    InvalidCredentials,
    UnknownModel(String),
    InvalidAvatar(String),
    Io(std::io::Error),
    Api(ApiError),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Api(ApiError::Unauthorized))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotLoggedIn => write!(f, "Not logged in. Run 'chatwire login' first."),
            ClientError::InvalidCredentials => write!(f, "Invalid username or password"),
            ClientError::UnknownModel(model) => write!(f, "Unknown model: {model}"),
            ClientError::InvalidAvatar(reason) => write!(f, "{reason}"),
            ClientError::Io(err) => write!(f, "{err}"),
            ClientError::Api(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for ClientError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ClientError::Io(err) => Some(err),
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api(err)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

struct PendingSend {
    context: SessionContext,
    request: ChatStreamRequest,
    user_index: usize,
    epoch: u64,
}

/// Returns the controller to `Idle` however the exchange ends, including
/// when the `send` future is dropped part-way. A reply left open by a
/// dropped future is closed with whatever text it has.
struct PhaseReset<'a> {
    state: &'a watch::Sender<ChatState>,
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if state.phase == SendPhase::Idle {
                return false;
            }
            state.phase = SendPhase::Idle;
            for message in &mut state.session.messages {
                if message.is_assistant() && !message.complete {
                    message.complete = true;
                }
            }
            true
        });
    }
}

pub struct ChatController<B> {
    backend: B,
    settings: ClientSettings,
    state: watch::Sender<ChatState>,
}

impl<B: ChatBackend> ChatController<B> {
    pub fn new(backend: B, settings: ClientSettings) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            backend,
            settings,
            state,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn context(&self) -> Option<SessionContext> {
        self.state.borrow().context.clone()
    }

    /// Remove and return queued notices.
    pub fn take_notices(&self) -> Vec<crate::core::state::Notice> {
        let mut taken = Vec::new();
        self.state.send_if_modified(|state| {
            taken = std::mem::take(&mut state.notices);
            !taken.is_empty()
        });
        taken
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Put `text` in the input buffer and send it.
    pub async fn submit(&self, text: impl Into<String>) -> SendOutcome {
        if self.state.borrow().is_busy() {
            return SendOutcome::Dropped;
        }
        self.set_input(text);
        self.send().await
    }

    /// Send the input buffer and consume the streamed reply.
    pub async fn send(&self) -> SendOutcome {
        let Some(pending) = self.begin_send() else {
            return SendOutcome::Dropped;
        };
        let _reset = PhaseReset { state: &self.state };
        self.run_exchange(pending).await
    }

    fn begin_send(&self) -> Option<PendingSend> {
        let mut pending = None;
        self.state.send_if_modified(|state| {
            if state.phase != SendPhase::Idle {
                debug!("send dropped: exchange already in flight");
                return false;
            }
            if state.input.trim().is_empty() {
                return false;
            }
            let Some(context) = state.context.clone() else {
                return false;
            };
            let Some(model_id) = state.current_model.clone() else {
                state.notify(NoticeKind::Warning, "No model selected");
                return true;
            };

            let text = std::mem::take(&mut state.input);
            let user_index = state.session.push(Message::user(text.clone()));
            state.phase = SendPhase::Sending;
            pending = Some(PendingSend {
                context,
                request: ChatStreamRequest {
                    message: text,
                    model_id,
                    session_id: state.session.id.clone(),
                },
                user_index,
                epoch: state.session_epoch,
            });
            true
        });
        pending
    }

    async fn run_exchange(&self, pending: PendingSend) -> SendOutcome {
        let PendingSend {
            context,
            request,
            user_index,
            epoch,
        } = pending;
        debug!(
            session_id = ?request.session_id,
            model = %request.model_id,
            "opening chat stream"
        );

        let opened = timeout(
            self.settings.request_timeout,
            self.backend.open_chat_stream(&context, &request),
        )
        .await
        .unwrap_or(Err(ApiError::Timeout));

        let byte_stream = match opened {
            Ok(stream) => stream,
            Err(ApiError::Unauthorized) => {
                self.state.send_modify(|state| {
                    if state.session_epoch == epoch {
                        state.session.retract(user_index, Role::User);
                    }
                    expire(state);
                });
                return SendOutcome::Unauthorized;
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "chat stream request failed");
                self.state.send_modify(|state| {
                    if state.session_epoch == epoch {
                        state.session.retract(user_index, Role::User);
                    }
                    state.notify(
                        NoticeKind::Error,
                        format!("Failed to send message: {reason}"),
                    );
                });
                return SendOutcome::NetworkFailure(reason);
            }
        };

        let mut draft = None;
        self.state.send_modify(|state| {
            state.phase = SendPhase::Streaming;
            if state.session_epoch == epoch {
                draft = Some(AssistantDraft::new(
                    state.session.push(Message::assistant_placeholder()),
                ));
            }
        });
        let mut draft = draft.unwrap_or_else(|| AssistantDraft::new(usize::MAX));

        let mut events = EventStream::new(byte_stream);
        loop {
            let Ok(next) = timeout(self.settings.stream_idle_timeout, events.next()).await
            else {
                let reason = ApiError::Timeout.to_string();
                warn!(error = %reason, "chat stream went idle");
                self.state.send_modify(|state| {
                    if state.session_epoch == epoch {
                        state.session.retract(draft.index(), Role::Assistant);
                        state.session.retract(user_index, Role::User);
                    }
                    state.notify(
                        NoticeKind::Error,
                        format!("Failed to send message: {reason}"),
                    );
                });
                return SendOutcome::NetworkFailure(reason);
            };

            match next {
                Some(Ok(event)) => {
                    let mut step = DraftStep::Ignored;
                    self.state.send_if_modified(|state| {
                        if state.session_epoch != epoch {
                            // The conversation was switched away; keep the
                            // terminal outcome but touch nothing.
                            step = draft.apply(&mut Session::new(), event);
                            return false;
                        }
                        step = draft.apply(&mut state.session, event);
                        step != DraftStep::Ignored
                    });

                    match step {
                        DraftStep::Appended | DraftStep::Ignored => {}
                        DraftStep::Completed { session_id } => {
                            return self.reconcile(&context, epoch, session_id).await;
                        }
                        DraftStep::Failed { message } => {
                            // The closed reply stays, even when empty.
                            self.state.send_modify(|state| {
                                state.notify(
                                    NoticeKind::Error,
                                    format!("AI reply failed: {message}"),
                                );
                            });
                            return SendOutcome::ContentError(message);
                        }
                    }
                }
                Some(Err(err)) => {
                    // Keep the user turn; drop only the partial reply.
                    let reason = err.to_string();
                    warn!(error = %reason, "chat stream interrupted");
                    self.state.send_modify(|state| {
                        if state.session_epoch == epoch {
                            state.session.retract(draft.index(), Role::Assistant);
                        }
                        state.notify(
                            NoticeKind::Error,
                            format!("Failed to send message: {reason}"),
                        );
                    });
                    return SendOutcome::NetworkFailure(reason);
                }
                None => {
                    self.state.send_modify(|state| {
                        if state.session_epoch == epoch {
                            draft.abandon(&mut state.session);
                            drop_if_empty(&mut state.session, &draft);
                        }
                        state.notify(
                            NoticeKind::Warning,
                            "The reply ended before the server confirmed it",
                        );
                    });
                    return SendOutcome::Incomplete;
                }
            }
        }
    }

    /// Bind the confirmed session id, count the exchange and refresh the
    /// session list so the new conversation shows up with its server title.
    /// Nothing is applied when the login changed while the reply streamed.
    async fn reconcile(
        &self,
        context: &SessionContext,
        epoch: u64,
        session_id: String,
    ) -> SendOutcome {
        let mut same_login = false;
        self.state.send_if_modified(|state| {
            if state.context.as_ref() != Some(context) {
                debug!("login changed during the reply; skipping reconcile");
                return false;
            }
            same_login = true;
            if state.session_epoch == epoch {
                if session_id.is_empty() {
                    warn!("completion event carried no session id");
                } else if state.session.bind_id(&session_id) == Binding::Bound {
                    debug!(%session_id, "new session bound");
                }
            }
            state.message_count += 1;
            true
        });

        if !same_login {
            return SendOutcome::Completed { session_id };
        }
        if let Err(err) = self.refresh_sessions_for(context).await {
            debug!(error = %err, "session refresh after reply failed");
        }
        SendOutcome::Completed { session_id }
    }

    // Sign-in lifecycle

    pub async fn register(&self, credentials: &Credentials) -> Result<(), ClientError> {
        let result = self.backend.register(credentials).await;
        self.state.send_modify(|state| match &result {
            Ok(()) => state.notify(NoticeKind::Success, "Registered, please log in"),
            Err(err) => state.notify(NoticeKind::Error, err.to_string()),
        });
        Ok(result?)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionContext, ClientError> {
        let context = match self.backend.login(credentials).await {
            Ok(context) => context,
            Err(ApiError::Unauthorized) => {
                self.state.send_modify(|state| {
                    state.notify(NoticeKind::Error, "Invalid username or password")
                });
                return Err(ClientError::InvalidCredentials);
            }
            Err(err) => {
                self.state
                    .send_modify(|state| state.notify(NoticeKind::Error, err.to_string()));
                return Err(err.into());
            }
        };

        self.state.send_modify(|state| {
            state.sign_out();
            state.context = Some(context.clone());
        });
        self.load_workspace().await;
        self.state
            .send_modify(|state| state.notify(NoticeKind::Success, "Logged in"));
        Ok(context)
    }

    /// Resume with a stored session cookie, validating it against the
    /// backend first.
    pub async fn restore(&self, context: SessionContext) -> Result<(), ClientError> {
        match self.backend.models(&context).await {
            Ok(models) => {
                self.state.send_modify(|state| {
                    state.sign_out();
                    state.context = Some(context);
                    state.catalog = ModelCatalog::from(models);
                    state.current_model = state.catalog.pick_current(
                        None,
                        self.settings.preferred_model.as_deref(),
                    );
                });
                let _ = self.load_sessions().await;
                let _ = self.load_user_info().await;
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                self.state.send_modify(expire);
                Err(ApiError::Unauthorized.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// User-initiated sign out.
    pub fn logout(&self) {
        self.state.send_modify(|state| {
            state.sign_out();
            state.notify(NoticeKind::Info, "Logged out");
        });
    }

    async fn load_workspace(&self) {
        let steps: [Result<(), ClientError>; 3] = [
            self.load_models().await,
            self.load_sessions().await,
            self.load_user_info().await,
        ];
        for err in steps.into_iter().filter_map(Result::err) {
            debug!(error = %err, "workspace load step failed");
        }
    }

    /// Run an authenticated call; a 401 expires the login.
    async fn authed<T, F, Fut>(&self, call: F) -> Result<T, ClientError>
    where
        F: FnOnce(SessionContext) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let context = self.context().ok_or(ClientError::NotLoggedIn)?;
        match call(context).await {
            Err(ApiError::Unauthorized) => {
                self.state.send_modify(expire);
                Err(ApiError::Unauthorized.into())
            }
            other => Ok(other?),
        }
    }

    fn report<T>(&self, result: Result<T, ClientError>, what: &str) -> Result<T, ClientError> {
        if let Err(err) = &result {
            if !err.is_unauthorized() {
                let text = format!("{what}: {err}");
                self.state
                    .send_modify(|state| state.notify(NoticeKind::Error, text));
            }
        }
        result
    }

    // Models and user

    pub async fn load_models(&self) -> Result<(), ClientError> {
        let result = self
            .authed(|context| async move { self.backend.models(&context).await })
            .await;
        let models = self.report(result, "Failed to load models")?;
        self.state.send_modify(|state| {
            state.catalog = ModelCatalog::from(models);
            state.current_model = state.catalog.pick_current(
                state.current_model.as_deref(),
                self.settings.preferred_model.as_deref(),
            );
        });
        Ok(())
    }

    pub fn select_model(&self, model_id: &str) -> Result<(), ClientError> {
        let mut accepted = false;
        self.state.send_if_modified(|state| {
            if !state.catalog.is_empty() && !state.catalog.contains(model_id) {
                return false;
            }
            state.current_model = Some(model_id.to_string());
            accepted = true;
            true
        });
        if accepted {
            Ok(())
        } else {
            Err(ClientError::UnknownModel(model_id.to_string()))
        }
    }

    pub async fn load_user_info(&self) -> Result<(), ClientError> {
        let result = self
            .authed(|context| async move { self.backend.user_info(&context).await })
            .await;
        let info = self.report(result, "Failed to load user info")?;
        self.state.send_modify(|state| {
            state.message_count = info.message_count;
            state.user = Some(info);
        });
        Ok(())
    }

    pub async fn upload_avatar(&self, path: &Path) -> Result<String, ClientError> {
        let upload = match read_avatar(path).await {
            Ok(upload) => upload,
            Err(err) => {
                let text = err.to_string();
                self.state
                    .send_modify(|state| state.notify(NoticeKind::Error, text));
                return Err(err);
            }
        };
        let result = self
            .authed(|context| async move { self.backend.upload_avatar(&context, upload).await })
            .await;
        let avatar = self.report(result, "Avatar upload failed")?;
        self.state.send_modify(|state| {
            if let Some(user) = state.user.as_mut() {
                user.avatar = avatar.clone();
            }
            state.notify(NoticeKind::Success, "Avatar updated");
        });
        Ok(avatar)
    }

    // Sessions

    pub async fn load_sessions(&self) -> Result<(), ClientError> {
        let context = self.context().ok_or(ClientError::NotLoggedIn)?;
        self.refresh_sessions_for(&context).await
    }

    async fn refresh_sessions_for(&self, context: &SessionContext) -> Result<(), ClientError> {
        let result = match self.backend.sessions(context).await {
            Err(ApiError::Unauthorized) => {
                self.state.send_modify(expire);
                Err(ApiError::Unauthorized.into())
            }
            other => other.map_err(ClientError::from),
        };
        let sessions = self.report(result, "Failed to load conversation history")?;
        self.state.send_if_modified(|state| {
            if state.context.as_ref() != Some(context) {
                return false;
            }
            state.sessions = sessions;
            state.date_filtered = false;
            true
        });
        Ok(())
    }

    pub fn start_new_chat(&self) {
        self.state
            .send_modify(|state| state.switch_session(Session::new()));
    }

    /// Make `session_id` the active conversation and load its messages.
    pub async fn open_session(&self, session_id: &str) -> Result<(), ClientError> {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.switch_session(Session::with_history(session_id, Vec::new()));
            epoch = state.session_epoch;
        });

        let result = self
            .authed(|context| async move { self.backend.conversation(&context, session_id).await })
            .await;
        let conversation = match self.report(result, "Failed to load conversation") {
            Ok(conversation) => conversation,
            Err(err) => {
                self.state.send_if_modified(|state| {
                    if state.session_epoch != epoch {
                        return false;
                    }
                    state.switch_session(Session::new());
                    true
                });
                return Err(err);
            }
        };
        self.state.send_if_modified(|state| {
            if state.session_epoch != epoch {
                return false;
            }
            state.session.messages = conversation
                .conversation
                .into_iter()
                .map(Message::from)
                .collect();
            if let Some(model) = conversation.model_id {
                if state.catalog.contains(&model) {
                    state.current_model = Some(model);
                }
            }
            true
        });
        Ok(())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        let result = self
            .authed(|context| async move { self.backend.delete_session(&context, session_id).await })
            .await;
        self.report(result, "Delete failed")?;
        self.state.send_modify(|state| {
            if state.session.id.as_deref() == Some(session_id) {
                state.switch_session(Session::new());
            }
            state.notify(NoticeKind::Success, "Conversation deleted");
        });
        self.load_sessions().await
    }

    /// Replace the session list with conversations created in the range.
    pub async fn search_sessions(
        &self,
        start_time: &str,
        end_time: &str,
    ) -> Result<usize, ClientError> {
        let range = DateRangeRequest {
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
        };
        let result = self
            .authed(|context| {
                let range = &range;
                async move { self.backend.sessions_in_range(&context, range).await }
            })
            .await;
        let sessions: Vec<SessionSummary> = self.report(result, "Search failed")?;
        let found = sessions.len();
        self.state.send_modify(|state| {
            state.sessions = sessions;
            state.date_filtered = true;
            if found == 0 {
                state.notify(
                    NoticeKind::Info,
                    "No conversations found in this time range",
                );
            } else {
                state.notify(NoticeKind::Success, format!("Found {found} conversations"));
            }
        });
        Ok(found)
    }

    pub async fn clear_date_filter(&self) -> Result<(), ClientError> {
        self.load_sessions().await?;
        self.state
            .send_modify(|state| state.notify(NoticeKind::Success, "Date filter cleared"));
        Ok(())
    }
}

/// Drop the login after the backend rejected it.
fn expire(state: &mut ChatState) {
    if state.context.is_none() {
        return;
    }
    state.sign_out();
    state.notify(
        NoticeKind::Warning,
        "Login expired, please sign in again",
    );
}

fn drop_if_empty(session: &mut Session, draft: &AssistantDraft) {
    if draft.content(session).is_some_and(str::is_empty) {
        session.retract(draft.index(), Role::Assistant);
    }
}

fn avatar_mime(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

async fn read_avatar(path: &Path) -> Result<AvatarUpload, ClientError> {
    let mime = avatar_mime(path).ok_or_else(|| {
        ClientError::InvalidAvatar("Please choose an image file".to_string())
    })?;
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_AVATAR_BYTES {
        return Err(ClientError::InvalidAvatar(
            "Image must not be larger than 2MB".to_string(),
        ));
    }
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());
    Ok(AvatarUpload {
        file_name,
        mime,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ConversationResponse, HistoryMessage, UserInfo};
    use crate::core::state::Notice;
    use crate::utils::test_utils::{summary, ScriptedBackend, StreamScript};
    use std::io::Write;

    const HELLO_REPLY: [&str; 3] = [
        "data: {\"content\":\"He\"}\n\n",
        "data: {\"content\":\"llo!\"}\n\n",
        "data: {\"done\":true,\"session_id\":\"s1\"}\n\n",
    ];

    fn credentials(password: &str) -> Credentials {
        Credentials {
            username: "alice".into(),
            password: password.into(),
        }
    }

    async fn signed_in(backend: ScriptedBackend) -> ChatController<ScriptedBackend> {
        signed_in_with(backend, ClientSettings::default()).await
    }

    async fn signed_in_with(
        backend: ScriptedBackend,
        settings: ClientSettings,
    ) -> ChatController<ScriptedBackend> {
        let controller = ChatController::new(backend, settings);
        controller
            .login(&credentials("secret"))
            .await
            .expect("login should succeed");
        controller.take_notices();
        controller
    }

    fn transcript(controller: &ChatController<ScriptedBackend>) -> Vec<(Role, String)> {
        controller
            .snapshot()
            .session
            .messages
            .into_iter()
            .map(|message| (message.role, message.content))
            .collect()
    }

    fn has_notice(notices: &[Notice], kind: NoticeKind, needle: &str) -> bool {
        notices
            .iter()
            .any(|notice| notice.kind == kind && notice.text.contains(needle))
    }

    #[tokio::test]
    async fn streamed_reply_becomes_assistant_message() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()));
        let controller = signed_in(backend).await;
        let lists_before = controller.backend().session_list_calls();

        let outcome = controller.submit("hi").await;

        assert_eq!(
            outcome,
            SendOutcome::Completed {
                session_id: "s1".into()
            }
        );
        assert_eq!(
            transcript(&controller),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "Hello!".to_string()),
            ]
        );
        let state = controller.snapshot();
        assert_eq!(state.session.id.as_deref(), Some("s1"));
        assert_eq!(state.message_count, 1);
        assert_eq!(state.phase, SendPhase::Idle);
        assert!(state.input.is_empty());
        assert!(state.session.messages.iter().all(|message| message.complete));

        let requests = controller.backend().stream_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message, "hi");
        assert_eq!(requests[0].model_id, "test-model");
        assert_eq!(requests[0].session_id, None);
        assert_eq!(controller.backend().session_list_calls(), lists_before + 1);
    }

    #[tokio::test]
    async fn observers_see_each_fragment() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()));
        let controller = signed_in(backend).await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        let watcher = async {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if let Some(last) = state.session.last().filter(|message| message.is_assistant()) {
                    if seen.last() != Some(&last.content) {
                        seen.push(last.content.clone());
                    }
                }
                if state.message_count == 1 && state.phase == SendPhase::Idle {
                    break;
                }
            }
            seen
        };

        let (outcome, seen) = tokio::join!(controller.submit("hi"), watcher);
        assert!(matches!(outcome, SendOutcome::Completed { .. }));
        assert_eq!(seen.last().map(String::as_str), Some("Hello!"));
    }

    #[tokio::test]
    async fn follow_up_reuses_session_and_keeps_binding() {
        let backend = ScriptedBackend::new()
            .with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()))
            .with_stream(StreamScript::Chunks(vec![
                "data: {\"content\":\"Again\"}\n\n",
                "data: {\"done\":true,\"session_id\":\"s1\"}\n\n",
            ]))
            .with_stream(StreamScript::Chunks(vec![
                "data: {\"content\":\"Third\"}\n\n",
                "data: {\"done\":true,\"session_id\":\"s2\"}\n\n",
            ]));
        backend.set_sessions(vec![summary("s1", "Greeting")]);
        let controller = signed_in(backend).await;

        controller.submit("hi").await;
        controller.submit("more").await;
        controller.submit("once more").await;

        let state = controller.snapshot();
        assert_eq!(state.session.id.as_deref(), Some("s1"));
        assert_eq!(state.session.messages.len(), 6);
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.message_count, 3);
        assert_eq!(state.current_session_title(), Some("Greeting"));

        let requests = controller.backend().stream_requests();
        assert_eq!(requests[1].session_id.as_deref(), Some("s1"));
        assert_eq!(requests[2].session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn server_error_keeps_partial_reply() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::Chunks(vec![
            "data: {\"content\":\"Par\"}\n\n",
            "data: {\"error\":\"boom\"}\n\n",
            "data: {\"content\":\"ignored\"}\n\n",
        ]));
        let controller = signed_in(backend).await;

        let outcome = controller.submit("hi").await;

        assert_eq!(outcome, SendOutcome::ContentError("boom".into()));
        assert_eq!(
            transcript(&controller),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "Par".to_string()),
            ]
        );
        let state = controller.snapshot();
        assert_eq!(state.message_count, 0);
        assert!(state.session.is_new());
        assert_eq!(state.phase, SendPhase::Idle);
        assert!(has_notice(&controller.take_notices(), NoticeKind::Error, "boom"));
    }

    #[tokio::test]
    async fn server_error_before_content_keeps_empty_reply() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::Chunks(vec![
            "data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n",
        ]));
        let controller = signed_in(backend).await;

        let outcome = controller.submit("hi").await;

        assert_eq!(outcome, SendOutcome::ContentError("quota exceeded".into()));
        assert_eq!(
            transcript(&controller),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, String::new()),
            ]
        );
        let state = controller.snapshot();
        assert!(state.session.messages[1].complete);
        assert_eq!(state.message_count, 0);
        assert_eq!(state.phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn rejected_login_rolls_back_and_signs_out() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Reject(ApiError::Unauthorized));
        let controller = signed_in(backend).await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        let watcher = async {
            let mut saw_reply = false;
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                saw_reply |= state.session.messages.iter().any(Message::is_assistant);
                if !state.is_logged_in() && state.phase == SendPhase::Idle {
                    break;
                }
            }
            saw_reply
        };

        let (outcome, saw_reply) = tokio::join!(controller.submit("hi"), watcher);

        assert_eq!(outcome, SendOutcome::Unauthorized);
        assert!(!saw_reply, "no reply placeholder may appear before the stream opens");
        let state = controller.snapshot();
        assert!(!state.is_logged_in());
        assert!(state.session.messages.is_empty());
        assert!(state.sessions.is_empty());
        assert_eq!(state.phase, SendPhase::Idle);
        assert!(has_notice(
            &controller.take_notices(),
            NoticeKind::Warning,
            "Login expired"
        ));
    }

    #[tokio::test]
    async fn failed_request_rolls_back_user_message() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::Reject(ApiError::Status {
            status: 500,
            detail: "upstream down".into(),
        }));
        let controller = signed_in(backend).await;

        let outcome = controller.submit("hi").await;

        assert!(matches!(outcome, SendOutcome::NetworkFailure(reason) if reason.contains("500")));
        let state = controller.snapshot();
        assert!(state.is_logged_in());
        assert!(state.session.messages.is_empty());
        assert_eq!(state.phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn transport_reset_mid_stream_drops_reply_but_keeps_user_turn() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::ChunksThenReset(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let controller = signed_in(backend).await;

        let outcome = controller.submit("hi").await;

        assert!(matches!(outcome, SendOutcome::NetworkFailure(_)));
        assert_eq!(transcript(&controller), vec![(Role::User, "hi".to_string())]);
        let state = controller.snapshot();
        assert_eq!(state.message_count, 0);
        assert_eq!(state.phase, SendPhase::Idle);
        assert!(has_notice(
            &controller.take_notices(),
            NoticeKind::Error,
            "Failed to send message"
        ));
    }

    #[tokio::test]
    async fn idle_stream_times_out_and_rolls_back() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::ChunksThenHang(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let settings = ClientSettings {
            stream_idle_timeout: Duration::from_millis(50),
            ..ClientSettings::default()
        };
        let controller = signed_in_with(backend, settings).await;

        let outcome = controller.submit("hi").await;

        assert_eq!(
            outcome,
            SendOutcome::NetworkFailure(ApiError::Timeout.to_string())
        );
        assert!(controller.snapshot().session.messages.is_empty());
        assert_eq!(controller.snapshot().phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn stream_closed_without_done_keeps_partial_reply() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::Chunks(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let controller = signed_in(backend).await;

        let outcome = controller.submit("hi").await;

        assert_eq!(outcome, SendOutcome::Incomplete);
        let state = controller.snapshot();
        assert_eq!(state.session.messages.len(), 2);
        assert_eq!(state.session.messages[1].content, "Par");
        assert!(state.session.messages[1].complete);
        assert!(state.session.is_new());
        assert!(has_notice(&controller.take_notices(), NoticeKind::Warning, "ended"));
    }

    #[tokio::test]
    async fn empty_stream_leaves_only_user_message() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::Chunks(Vec::new()));
        let controller = signed_in(backend).await;

        assert_eq!(controller.submit("hi").await, SendOutcome::Incomplete);
        assert_eq!(transcript(&controller), vec![(Role::User, "hi".to_string())]);
    }

    #[tokio::test]
    async fn send_while_streaming_is_dropped() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::ChunksThenHang(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let controller = signed_in(backend).await;
        let mut rx = controller.subscribe();

        let mut first = Box::pin(controller.submit("first"));
        tokio::select! {
            _ = &mut first => panic!("first exchange should still be streaming"),
            streaming = rx.wait_for(|state| state.phase == SendPhase::Streaming) => {
                assert!(streaming.is_ok());
            }
        }

        assert_eq!(controller.submit("second").await, SendOutcome::Dropped);
        assert_eq!(controller.backend().stream_requests().len(), 1);

        drop(first);
        assert_eq!(controller.snapshot().phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn send_while_request_is_pending_is_dropped() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::NeverOpens);
        let controller = signed_in(backend).await;
        let mut rx = controller.subscribe();

        let mut first = Box::pin(controller.submit("first"));
        tokio::select! {
            _ = &mut first => panic!("first exchange should still be waiting for the server"),
            sending = rx.wait_for(|state| state.phase == SendPhase::Sending) => {
                assert!(sending.is_ok());
            }
        }

        assert_eq!(controller.submit("second").await, SendOutcome::Dropped);
        assert_eq!(controller.backend().stream_requests().len(), 1);
        assert_eq!(transcript(&controller), vec![(Role::User, "first".to_string())]);
        assert!(controller.snapshot().input.is_empty());

        drop(first);
        assert_eq!(controller.snapshot().phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn dropping_send_mid_stream_closes_partial_reply() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::ChunksThenHang(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let controller = signed_in(backend).await;
        let mut rx = controller.subscribe();

        let mut first = Box::pin(controller.submit("hi"));
        tokio::select! {
            _ = &mut first => panic!("exchange should still be streaming"),
            partial = rx.wait_for(|state| {
                state.session.last().is_some_and(|message| message.content == "Par")
            }) => {
                assert!(partial.is_ok());
            }
        }
        drop(first);

        let state = controller.snapshot();
        assert_eq!(state.phase, SendPhase::Idle);
        assert_eq!(state.session.messages.len(), 2);
        assert_eq!(state.session.messages[1].content, "Par");
        assert!(state.session.messages.iter().all(|message| message.complete));
    }

    #[tokio::test]
    async fn logout_mid_stream_skips_reconcile() {
        let (feed, chunks) = tokio::sync::mpsc::unbounded_channel();
        let backend = ScriptedBackend::new().with_stream(StreamScript::Fed(chunks));
        let controller = signed_in(backend).await;
        let lists_before = controller.backend().session_list_calls();
        let mut rx = controller.subscribe();

        let driver = async {
            feed.send("data: {\"content\":\"Par\"}\n\n").expect("feed");
            let partial = rx
                .wait_for(|state| {
                    state.session.last().is_some_and(|message| message.content == "Par")
                })
                .await
                .is_ok();
            assert!(partial);
            controller.logout();
            feed.send("data: {\"done\":true,\"session_id\":\"s1\"}\n\n")
                .expect("feed");
        };
        let (outcome, ()) = tokio::join!(controller.submit("hi"), driver);

        assert_eq!(
            outcome,
            SendOutcome::Completed {
                session_id: "s1".into()
            }
        );
        let state = controller.snapshot();
        assert!(!state.is_logged_in());
        assert_eq!(state.message_count, 0);
        assert!(state.session.is_new());
        assert!(state.session.messages.is_empty());
        assert_eq!(state.phase, SendPhase::Idle);
        assert_eq!(controller.backend().session_list_calls(), lists_before);
    }

    #[tokio::test]
    async fn switching_session_mid_stream_protects_new_session() {
        let backend = ScriptedBackend::new().with_stream(StreamScript::ChunksThenHang(vec![
            "data: {\"content\":\"Par\"}\n\n",
        ]));
        let settings = ClientSettings {
            stream_idle_timeout: Duration::from_millis(100),
            ..ClientSettings::default()
        };
        let controller = signed_in_with(backend, settings).await;
        let mut rx = controller.subscribe();

        let mut first = Box::pin(controller.submit("first"));
        tokio::select! {
            _ = &mut first => panic!("first exchange should still be streaming"),
            streaming = rx.wait_for(|state| state.phase == SendPhase::Streaming) => {
                assert!(streaming.is_ok());
            }
        }
        controller.start_new_chat();
        controller.set_input("draft");

        assert!(matches!(first.await, SendOutcome::NetworkFailure(_)));
        let state = controller.snapshot();
        assert!(state.session.messages.is_empty());
        assert_eq!(state.input, "draft");
        assert_eq!(state.phase, SendPhase::Idle);
    }

    #[tokio::test]
    async fn blank_input_and_signed_out_sends_are_dropped() {
        let backend = ScriptedBackend::new();
        let controller = ChatController::new(backend, ClientSettings::default());

        assert_eq!(controller.submit("hi").await, SendOutcome::Dropped);

        controller
            .login(&credentials("secret"))
            .await
            .expect("login should succeed");
        assert_eq!(controller.submit("   ").await, SendOutcome::Dropped);
        assert!(controller.backend().stream_requests().is_empty());
        assert!(controller.snapshot().session.messages.is_empty());
    }

    #[tokio::test]
    async fn send_without_model_warns() {
        let controller = signed_in(ScriptedBackend::new()).await;
        controller.state.send_modify(|state| state.current_model = None);

        assert_eq!(controller.submit("hi").await, SendOutcome::Dropped);
        assert!(has_notice(
            &controller.take_notices(),
            NoticeKind::Warning,
            "No model"
        ));
        assert_eq!(controller.snapshot().input, "hi");
    }

    #[tokio::test]
    async fn session_refresh_rejection_expires_login_after_reply() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()));
        let controller = signed_in(backend).await;
        *controller.backend().sessions_error.lock().expect("lock") = Some(ApiError::Unauthorized);

        let outcome = controller.submit("hi").await;

        assert!(matches!(outcome, SendOutcome::Completed { .. }));
        assert!(!controller.snapshot().is_logged_in());
    }

    #[tokio::test]
    async fn login_loads_workspace() {
        let backend = ScriptedBackend::new();
        backend.set_sessions(vec![summary("s1", "First")]);
        *backend.user.lock().expect("lock") = UserInfo {
            username: "alice".into(),
            message_count: 12,
            avatar: String::new(),
        };
        let controller = ChatController::new(backend, ClientSettings::default());

        let context = controller
            .login(&credentials("secret"))
            .await
            .expect("login should succeed");

        assert_eq!(context.user_id, "1");
        let state = controller.snapshot();
        assert_eq!(state.current_model.as_deref(), Some("test-model"));
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.message_count, 12);
        assert_eq!(
            state.user.as_ref().map(|user| user.username.as_str()),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn wrong_password_is_reported() {
        let controller = ChatController::new(ScriptedBackend::new(), ClientSettings::default());

        let result = controller.login(&credentials("wrong")).await;

        assert!(matches!(result, Err(ClientError::InvalidCredentials)));
        assert!(!controller.snapshot().is_logged_in());
    }

    #[tokio::test]
    async fn restore_validates_stored_context() {
        let controller = ChatController::new(ScriptedBackend::new(), ClientSettings::default());

        controller
            .restore(SessionContext::new("9"))
            .await
            .expect("restore should succeed");

        let state = controller.snapshot();
        assert_eq!(state.context, Some(SessionContext::new("9")));
        assert_eq!(state.current_model.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()));
        let controller = signed_in(backend).await;
        controller.submit("hi").await;

        controller.logout();

        let state = controller.snapshot();
        assert!(!state.is_logged_in());
        assert!(state.session.messages.is_empty());
        assert_eq!(state.message_count, 0);
    }

    #[tokio::test]
    async fn select_model_checks_catalog() {
        let controller = signed_in(ScriptedBackend::new()).await;

        assert!(matches!(
            controller.select_model("missing"),
            Err(ClientError::UnknownModel(_))
        ));
        assert!(controller.select_model("test-model").is_ok());
    }

    #[tokio::test]
    async fn open_session_loads_history() {
        let backend = ScriptedBackend::new();
        backend.conversations.lock().expect("lock").push((
            "s7".into(),
            ConversationResponse {
                conversation: vec![
                    HistoryMessage {
                        role: Role::User,
                        content: "old question".into(),
                        timestamp: Some("2025-01-01T10:00:00".into()),
                    },
                    HistoryMessage {
                        role: Role::Assistant,
                        content: "old answer".into(),
                        timestamp: None,
                    },
                ],
                model_id: Some("test-model".into()),
                create_time: None,
            },
        ));
        let controller = signed_in(backend).await;

        controller
            .open_session("s7")
            .await
            .expect("open should succeed");

        let state = controller.snapshot();
        assert_eq!(state.session.id.as_deref(), Some("s7"));
        assert_eq!(
            transcript(&controller),
            vec![
                (Role::User, "old question".to_string()),
                (Role::Assistant, "old answer".to_string()),
            ]
        );
        assert_eq!(
            state.session.messages[0].timestamp_iso(),
            "2025-01-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn open_missing_session_reports_error() {
        let controller = signed_in(ScriptedBackend::new()).await;

        let result = controller.open_session("nope").await;

        assert!(matches!(result, Err(ClientError::Api(ApiError::NotFound(_)))));
        assert!(controller.snapshot().session.is_new());
        assert!(has_notice(
            &controller.take_notices(),
            NoticeKind::Error,
            "Failed to load conversation"
        ));
    }

    #[tokio::test]
    async fn deleting_active_session_starts_new_chat() {
        let backend =
            ScriptedBackend::new().with_stream(StreamScript::Chunks(HELLO_REPLY.to_vec()));
        backend.set_sessions(vec![summary("s1", "Greeting"), summary("s2", "Other")]);
        let controller = signed_in(backend).await;
        controller.submit("hi").await;

        controller
            .delete_session("s1")
            .await
            .expect("delete should succeed");

        let state = controller.snapshot();
        assert!(state.session.is_new());
        assert!(state.session.messages.is_empty());
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(*controller.backend().deleted.lock().expect("lock"), vec!["s1"]);
    }

    #[tokio::test]
    async fn date_search_filters_and_clears() {
        let backend = ScriptedBackend::new();
        let mut early = summary("s1", "Early");
        early.create_time = Some("2025-01-01T08:00:00".into());
        let mut late = summary("s2", "Late");
        late.create_time = Some("2025-03-01T08:00:00".into());
        backend.set_sessions(vec![early, late]);
        let controller = signed_in(backend).await;

        let found = controller
            .search_sessions("2025-02-01T00:00:00", "2025-03-31T23:59:59")
            .await
            .expect("search should succeed");

        assert_eq!(found, 1);
        let state = controller.snapshot();
        assert!(state.date_filtered);
        assert_eq!(state.sessions[0].session_id, "s2");

        controller
            .clear_date_filter()
            .await
            .expect("clear should succeed");
        let state = controller.snapshot();
        assert!(!state.date_filtered);
        assert_eq!(state.sessions.len(), 2);
    }

    #[tokio::test]
    async fn avatar_upload_validates_file() {
        let controller = signed_in(ScriptedBackend::new()).await;
        let dir = tempfile::tempdir().expect("tempdir");

        let text_file = dir.path().join("notes.txt");
        std::fs::write(&text_file, b"hello").expect("write");
        assert!(matches!(
            controller.upload_avatar(&text_file).await,
            Err(ClientError::InvalidAvatar(_))
        ));

        let large = dir.path().join("large.png");
        let mut file = std::fs::File::create(&large).expect("create");
        file.write_all(&vec![0_u8; (MAX_AVATAR_BYTES + 1) as usize])
            .expect("write");
        assert!(matches!(
            controller.upload_avatar(&large).await,
            Err(ClientError::InvalidAvatar(reason)) if reason.contains("2MB")
        ));

        let image = dir.path().join("me.PNG");
        std::fs::write(&image, b"\x89PNG").expect("write");
        let avatar = controller
            .upload_avatar(&image)
            .await
            .expect("upload should succeed");
        assert_eq!(avatar, "/static/avatars/me.PNG");
        assert_eq!(
            controller.snapshot().user.map(|user| user.avatar),
            Some(avatar)
        );
    }
}
