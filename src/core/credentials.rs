//! Session cookie persistence in the system keyring.
//!
//! The backend identifies a signed-in user by the `user_id` cookie it sets at
//! login. That value is stored per backend URL so separate portals keep
//! separate logins.

use std::error::Error;
use std::fmt;

use keyring::Entry;
use tracing::debug;

use crate::core::backend::SessionContext;

const KEYRING_SERVICE: &str = "chatwire";

/// Environment variable that supplies the user id directly, bypassing the
/// keyring.
pub const USER_ID_ENV: &str = "CHATWIRE_USER_ID";

/// Describes failures when attempting to access the system keyring.
///
/// Recoverable errors indicate that the credential backend was
/// temporarily unavailable (for example when the keychain service is
/// locked or inaccessible). Permanent errors surface the underlying
/// cause directly so callers can report them to the user.
#[derive(Debug)]
pub enum CredentialError {
    Recoverable(keyring::Error),
    Permanent(keyring::Error),
}

impl CredentialError {
    fn inner(&self) -> &keyring::Error {
        match self {
            CredentialError::Recoverable(err) | CredentialError::Permanent(err) => err,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, CredentialError::Recoverable(_))
    }
}

impl From<keyring::Error> for CredentialError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                CredentialError::Recoverable(err)
            }
            other => CredentialError::Permanent(other),
        }
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keyring error: {}", self.inner())
    }
}

impl Error for CredentialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CredentialStore {
    use_keyring: bool,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self { use_keyring: true }
    }

    pub fn new_with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    /// Session for `base_url`, from the environment override or the keyring.
    pub fn load(&self, base_url: &str) -> Result<Option<SessionContext>, CredentialError> {
        self.load_with_override(base_url, std::env::var(USER_ID_ENV).ok())
    }

    fn load_with_override(
        &self,
        base_url: &str,
        override_id: Option<String>,
    ) -> Result<Option<SessionContext>, CredentialError> {
        if let Some(user_id) = override_id.filter(|id| !id.trim().is_empty()) {
            debug!("using user id from {USER_ID_ENV}");
            return Ok(Some(SessionContext::new(user_id.trim())));
        }
        if !self.use_keyring {
            return Ok(None);
        }

        let entry = Entry::new(KEYRING_SERVICE, base_url)?;
        match entry.get_password() {
            Ok(user_id) => Ok(Some(SessionContext::new(user_id))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn store(&self, base_url: &str, context: &SessionContext) -> Result<(), CredentialError> {
        if !self.use_keyring {
            return Ok(());
        }
        let entry = Entry::new(KEYRING_SERVICE, base_url)?;
        entry.set_password(&context.user_id)?;
        Ok(())
    }

    /// Returns whether a stored session was removed.
    pub fn remove(&self, base_url: &str) -> Result<bool, CredentialError> {
        if !self.use_keyring {
            return Ok(false);
        }
        let entry = Entry::new(KEYRING_SERVICE, base_url)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
