//! Remote credentials in the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Nothing secret is ever written to the
//! SQLite database.

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::normalize_base_url;
use crate::error::AuthError;

const SERVICE_NAME: &str = "shopsync";

// Credential keys
pub const KEY_REMOTE_URL: &str = "remote_url";
pub const KEY_API_KEY: &str = "api_key";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_REMOTE_URL, KEY_API_KEY];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<Zeroizing<String>> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(Zeroizing::new(pw)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), AuthError> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| AuthError::Keyring(e.to_string()))?;
    entry
        .set_password(value)
        .map_err(|e| AuthError::Keyring(e.to_string()))
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), AuthError> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| AuthError::Keyring(e.to_string()))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AuthError::Keyring(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// What the remote adapter needs to talk to the backend.
pub struct Credentials {
    pub remote_url: String,
    pub api_key: Zeroizing<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("remote_url", &self.remote_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// The auth gate: both values must be present and non-blank.
    pub fn from_parts(
        remote_url: Option<&str>,
        api_key: Option<Zeroizing<String>>,
    ) -> Result<Self, AuthError> {
        let remote_url = remote_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::NotConfigured(KEY_REMOTE_URL))?;
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AuthError::NotConfigured(KEY_API_KEY))?;
        Ok(Self {
            remote_url: normalize_base_url(remote_url),
            api_key,
        })
    }
}

/// Load the stored credentials, failing when any is missing.
pub fn load_credentials() -> Result<Credentials, AuthError> {
    let url = get_credential(KEY_REMOTE_URL);
    Credentials::from_parts(url.as_deref().map(String::as_str), get_credential(KEY_API_KEY))
}

/// Remote sync is possible once both credentials are stored.
pub fn is_configured() -> bool {
    load_credentials().is_ok()
}

/// Store the credentials received during setup.
pub fn save_credentials(remote_url: &str, api_key: &str) -> Result<(), AuthError> {
    let creds = Credentials::from_parts(
        Some(remote_url),
        Some(Zeroizing::new(api_key.trim().to_string())),
    )?;
    set_credential(KEY_REMOTE_URL, &creds.remote_url)?;
    set_credential(KEY_API_KEY, creds.api_key.as_str())?;
    info!(remote_url = %creds.remote_url, "remote credentials updated");
    Ok(())
}

/// Delete every stored credential.
pub fn factory_reset() -> Result<(), AuthError> {
    info!("performing factory reset – deleting all credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}
