//! Data-driven setting handlers.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::data::{
    Config, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
};
use crate::utils::url::validate_base_url;

/// Handler for string settings, checked by `validate` before saving.
pub struct StringHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    default_display: Option<&'static str>,
    validate: fn(&str) -> Result<String, String>,
    get: fn(&Config) -> Option<&String>,
    set_field: fn(&mut Config, Option<String>),
}

impl SettingHandler for StringHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let input = args.join(" ");
        if input.trim().is_empty() {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        }

        let value = (self.validate)(input.trim()).map_err(|reason| SettingError::InvalidValue {
            key: self.key,
            reason,
        })?;
        let set_field = self.set_field;
        let stored = value.clone();
        ctx.mutate(move |config| set_field(config, Some(stored)))?;

        Ok(format!("✅ Set {} to: {value}", self.key))
    }

    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let set_field = self.set_field;
        ctx.mutate(move |config| set_field(config, None))?;

        Ok(match self.default_display {
            Some(default) => format!("✅ Unset {} (will use default: {default})", self.key),
            None => format!("✅ Unset {}", self.key),
        })
    }

    fn format(&self, config: &Config) -> String {
        match ((self.get)(config), self.default_display) {
            (Some(value), _) => format!("  {}: {value}", self.key),
            (None, Some(default)) => format!("  {}: (unset, default: {default})", self.key),
            (None, None) => format!("  {}: (unset)", self.key),
        }
    }
}

/// Handler for positive durations given in whole seconds.
pub struct SecondsHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    default_secs: u64,
    get: fn(&Config) -> Option<u64>,
    set_field: fn(&mut Config, Option<u64>),
}

impl SettingHandler for SecondsHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let Some(input) = args.first() else {
            return Err(SettingError::MissingArgs {
                hint: self.hint,
                example: self.example,
            });
        };

        let secs = parse_seconds(input).map_err(|reason| SettingError::InvalidValue {
            key: self.key,
            reason,
        })?;
        let set_field = self.set_field;
        ctx.mutate(move |config| set_field(config, Some(secs)))?;

        Ok(format!("✅ Set {} to: {secs}s", self.key))
    }

    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let set_field = self.set_field;
        ctx.mutate(move |config| set_field(config, None))?;

        Ok(format!(
            "✅ Unset {} (will use default: {}s)",
            self.key, self.default_secs
        ))
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(secs) => format!("  {}: {secs}s", self.key),
            None => format!("  {}: (unset, default: {}s)", self.key, self.default_secs),
        }
    }
}

/// Accepts `45` or `45s`.
fn parse_seconds(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let digits = trimmed.strip_suffix('s').unwrap_or(trimmed);
    match digits.parse::<u64>() {
        Ok(0) => Err("must be at least 1 second".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err(format!("'{input}' is not a number of seconds")),
    }
}

fn accept_any(value: &str) -> Result<String, String> {
    Ok(value.to_string())
}

pub fn base_url_handler() -> StringHandler {
    StringHandler {
        key: "base-url",
        hint: "To set the backend URL, specify it:",
        example: "chatwire set base-url https://chat.example.com",
        default_display: Some(DEFAULT_BASE_URL),
        validate: validate_base_url,
        get: |c| c.base_url.as_ref(),
        set_field: |c, v| c.base_url = v,
    }
}

pub fn default_model_handler() -> StringHandler {
    StringHandler {
        key: "default-model",
        hint: "To set a default model, specify its id:",
        example: "chatwire set default-model deepseek-chat",
        default_display: None,
        validate: accept_any,
        get: |c| c.default_model.as_ref(),
        set_field: |c, v| c.default_model = v,
    }
}

pub fn request_timeout_handler() -> SecondsHandler {
    SecondsHandler {
        key: "request-timeout",
        hint: "To set the request timeout, specify seconds:",
        example: "chatwire set request-timeout 30",
        default_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        get: |c| c.request_timeout_secs,
        set_field: |c, v| c.request_timeout_secs = v,
    }
}

pub fn stream_idle_timeout_handler() -> SecondsHandler {
    SecondsHandler {
        key: "stream-idle-timeout",
        hint: "To set how long a reply may stall, specify seconds:",
        example: "chatwire set stream-idle-timeout 120",
        default_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
        get: |c| c.stream_idle_timeout_secs,
        set_field: |c, v| c.stream_idle_timeout_secs = v,
    }
}
