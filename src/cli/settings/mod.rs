//! Settings management for CLI set/unset commands.
//!
//! Each configuration key has a handler that parses, validates, persists
//! and formats its value. String-valued keys (`base-url`, `default-model`)
//! and duration keys (`request-timeout`, `stream-idle-timeout`) share
//! data-driven handler types.

pub mod error;
pub mod handlers;
pub mod registry;

use std::path::Path;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::data::Config;

/// Context provided to setting handlers during set/unset operations.
pub struct SetContext<'a> {
    pub config_path: &'a Path,
}

impl SetContext<'_> {
    /// Apply `mutator` to the stored config.
    pub fn mutate<F>(&self, mutator: F) -> Result<(), SettingError>
    where
        F: FnOnce(&mut Config),
    {
        Config::mutate_at(self.config_path, mutator)
            .map_err(|err| SettingError::ConfigError(err.to_string()))
    }
}

/// Trait for handling a configuration setting.
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Set the configuration value from the words after the key.
    ///
    /// Returns a success message to display.
    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError>;

    /// Unset (clear) the configuration value.
    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError>;

    /// Format the current value for display in `chatwire set` output.
    fn format(&self, config: &Config) -> String;
}

/// Run `chatwire set <key> [value...]`.
pub fn run_set(key: &str, value: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    handler.set(value, ctx)
}

/// Run `chatwire unset <key>`.
pub fn run_unset(key: &str, ctx: &SetContext<'_>) -> Result<String, SettingError> {
    let registry = SettingRegistry::new();
    let handler = registry
        .get(key)
        .ok_or_else(|| SettingError::UnknownKey(key.to_string()))?;
    handler.unset(ctx)
}
