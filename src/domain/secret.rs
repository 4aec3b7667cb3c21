//! Secret strings
//!
//! Tokens, API keys and client secrets. `Debug` never prints the value, so a
//! stray `{:?}` in a log line cannot leak credential material.

use std::fmt;

/// An opaque secret value (access token, refresh token, API key).
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

/// Access token issued by a provider
pub type AccessToken = SecretString;

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw value. Only call this when writing it onto the wire
    /// or into the credential store.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
