use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::client::ClientSettings;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root URL of the chat portal backend
    pub base_url: Option<String>,
    /// Model selected at sign-in when the backend offers it
    pub default_model: Option<String>,
    /// Deadline for ordinary requests, in seconds
    pub request_timeout_secs: Option<u64>,
    /// Longest pause between two streamed reply events, in seconds
    pub stream_idle_timeout_secs: Option<u64>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    /// Resolve the backend URL: explicit override, then the config file,
    /// then the built-in default.
    pub fn resolve_base_url(&self, override_url: Option<&str>) -> String {
        let raw = override_url
            .filter(|url| !url.trim().is_empty())
            .or(self.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL);
        normalize_base_url(raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.stream_idle_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout(),
            stream_idle_timeout: self.stream_idle_timeout(),
            preferred_model: self.default_model.clone(),
        }
    }
}
