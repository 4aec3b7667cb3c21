//! Provider credentials
//!
//! Per-user OAuth credentials and the identifiers of the external providers
//! they belong to.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::secret::{AccessToken, SecretString};

/// External providers this backend integrates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(alias = "google", alias = "calendar")]
    GoogleCalendar,
    #[serde(alias = "m-pesa")]
    Mpesa,
    Paystack,
    Flutterwave,
    Stripe,
    #[serde(alias = "pay_pal")]
    Paypal,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::GoogleCalendar,
        ProviderKind::Mpesa,
        ProviderKind::Paystack,
        ProviderKind::Flutterwave,
        ProviderKind::Stripe,
        ProviderKind::Paypal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleCalendar => "google_calendar",
            ProviderKind::Mpesa => "mpesa",
            ProviderKind::Paystack => "paystack",
            ProviderKind::Flutterwave => "flutterwave",
            ProviderKind::Stripe => "stripe",
            ProviderKind::Paypal => "paypal",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown provider name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google_calendar" | "google" | "calendar" => Ok(ProviderKind::GoogleCalendar),
            "mpesa" | "m-pesa" => Ok(ProviderKind::Mpesa),
            "paystack" => Ok(ProviderKind::Paystack),
            "flutterwave" => Ok(ProviderKind::Flutterwave),
            "stripe" => Ok(ProviderKind::Stripe),
            "paypal" => Ok(ProviderKind::Paypal),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Tokens returned by an authorization-code or refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: Option<SecretString>,
    /// Lifetime in seconds, if the provider reported one
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|seconds| issued_at + Duration::seconds(seconds.max(0)))
    }
}

/// A user's stored credential for one provider.
///
/// A credential without a refresh token cannot be renewed silently; once it
/// expires the user has to reauthorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: Uuid,
    pub provider: ProviderKind,
    pub access_token: AccessToken,
    pub refresh_token: Option<SecretString>,
    /// Absent means "assume long-lived until a call fails"
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Build a credential from a successful authorization-code exchange.
    pub fn from_grant(
        user_id: Uuid,
        provider: ProviderKind,
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let expires_at = grant.expires_at(issued_at);
        Self {
            user_id,
            provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }

    /// True when an expiry is recorded and `now` is within `margin` of it.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        matches!(self.expires_at, Some(expiry) if now + margin >= expiry)
    }

    /// Apply a refresh grant. Providers that do not rotate refresh tokens
    /// omit them from the response, in which case the current one is kept.
    pub fn refreshed(&self, grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let expires_at = grant.expires_at(issued_at);
        Self {
            user_id: self.user_id,
            provider: self.provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at,
        }
    }

    /// Expired credentials that cannot be refreshed need reauthorization.
    pub fn connection_state(&self, now: DateTime<Utc>) -> ConnectionState {
        match (self.is_expired(now), self.can_refresh()) {
            (false, _) => ConnectionState::Connected,
            (true, true) => ConnectionState::Expired,
            (true, false) => ConnectionState::Revoked,
        }
    }
}

/// OAuth connection lifecycle.
///
/// Only `Connected` and `Disconnected` correspond to stored data. `Expired`
/// is derived from the expiry at use time; `Revoked` is reported when the
/// credential can no longer be renewed and behaves like `Disconnected` until
/// the user reauthorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    PendingAuthorization,
    Connected,
    Expired,
    Revoked,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::PendingAuthorization => "pending_authorization",
            ConnectionState::Connected => "connected",
            ConnectionState::Expired => "expired",
            ConnectionState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
