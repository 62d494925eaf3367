//! Wire payloads exchanged with the chat portal backend.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::message::{Message, Role};

pub mod admin;
pub mod client;
pub mod models;

#[derive(Serialize, Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatStreamRequest {
    pub message: String,
    pub model_id: String,
    /// Serialized as `null` for a conversation the server has not seen yet.
    pub session_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderModel {
    pub model_id: String,
    pub model_name: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, Vec<ProviderModel>>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Deserialize, Debug)]
pub struct AvatarResponse {
    pub avatar: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
}

impl SessionSummary {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.preview.as_deref())
            .filter(|title| !title.is_empty())
            .unwrap_or("New conversation")
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct SessionsResponse {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl From<HistoryMessage> for Message {
    fn from(entry: HistoryMessage) -> Self {
        let mut message = Message::new(entry.role, entry.content);
        if let Some(timestamp) = entry.timestamp.as_deref().and_then(parse_timestamp) {
            message.timestamp = timestamp;
        }
        message
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ConversationResponse {
    #[serde(default)]
    pub conversation: Vec<HistoryMessage>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct DateRangeRequest {
    pub start_time: String,
    pub end_time: String,
}

/// Accepts RFC 3339 and the offset-less ISO-8601 form the backend emits,
/// which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
