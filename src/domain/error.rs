//! Integration Error Types
//!
//! Every provider-facing failure is classified into this taxonomy at the
//! adapter boundary. Raw transport errors never travel further up.

use std::time::Duration;
use thiserror::Error;

use super::credential::ProviderKind;
use super::request::Operation;

/// Classified integration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrationError {
    /// No credential on file for this user and provider
    #[error("{provider} is not connected")]
    NotConnected { provider: ProviderKind },

    /// Refresh token revoked or invalid, or the provider refused the access token
    #[error("{provider} authorization is no longer valid; reauthorization required")]
    ReauthorizationRequired { provider: ProviderKind },

    /// Timeout, 5xx, rate limit or network failure; safe to retry later
    #[error("{provider} is temporarily unavailable: {message}")]
    Transient {
        provider: ProviderKind,
        message: String,
        timed_out: bool,
    },

    /// The provider refused the request parameters
    #[error("{provider} rejected the request: {message}")]
    ProviderRejected {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    /// Provider does not offer this operation
    #[error("{operation} is not supported by {provider}")]
    UnsupportedOperation {
        provider: ProviderKind,
        operation: Operation,
    },

    /// Missing or invalid process-level credentials/endpoints
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The credential store could not be read or written
    #[error("Credential store error: {0}")]
    CredentialStore(String),
}

impl IntegrationError {
    pub fn transient(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Transient {
            provider,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(provider: ProviderKind, after: Duration) -> Self {
        Self::Transient {
            provider,
            message: format!("no response within {}s", after.as_secs_f64()),
            timed_out: true,
        }
    }

    pub fn rejected(provider: ProviderKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ProviderRejected {
            provider,
            status,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Safe to resubmit unchanged later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The user has to link the provider again
    pub fn requires_relink(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::ReauthorizationRequired { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transient { timed_out: true, .. })
    }
}

/// An integration error annotated with the provider and operation that failed.
///
/// Messages are built from classified errors only, never from raw requests,
/// so they carry no credential material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} via {provider} failed: {error}")]
pub struct IntegrationFailure {
    pub provider: ProviderKind,
    pub operation: Operation,
    pub error: IntegrationError,
}

impl IntegrationFailure {
    pub fn new(provider: ProviderKind, operation: Operation, error: IntegrationError) -> Self {
        Self {
            provider,
            operation,
            error,
        }
    }
}
