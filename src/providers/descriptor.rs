//! Static provider descriptors
//!
//! What each provider is, where it lives, how it authenticates and which
//! operations it offers.

use serde::Serialize;

use crate::domain::{CurrencyCode, Operation, ProviderKind};

/// How requests to the provider are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// HTTP basic auth
    Basic,
    /// Timestamp-derived password recomputed on every call
    SignedPassword,
}

/// Whose credential the provider needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// A per-user OAuth credential from the credential store
    User,
    /// A process-wide service credential from configuration
    Service,
}

/// Currency and minor-unit exponent of amounts the provider reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrencyUnits {
    pub currency: CurrencyCode,
    /// Reported amounts are divided by 10^exponent to get major units
    pub minor_unit_exponent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub base_url: String,
    pub auth_scheme: AuthScheme,
    pub credential_source: CredentialSource,
    pub units: Option<CurrencyUnits>,
    pub operations: &'static [Operation],
}

impl ProviderDescriptor {
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn requires_user_credential(&self) -> bool {
        self.credential_source == CredentialSource::User
    }

    /// Join `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Default reporting currency, falling back to KES.
    pub fn default_currency(&self) -> CurrencyCode {
        self.units.map(|u| u.currency).unwrap_or(CurrencyCode::KES)
    }
}
