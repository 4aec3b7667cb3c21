//! Provider Adapter Set
//!
//! One adapter per external calendar or payment provider. Each normalizes
//! its provider's authentication, request shapes, currency units and error
//! responses into the shared capability contract below.

pub mod descriptor;
pub mod flutterwave;
pub mod google_calendar;
pub mod http;
pub mod mpesa;
pub mod paypal;
pub mod paystack;
mod registry;
pub mod stripe;

use async_trait::async_trait;

use crate::domain::{
    AccessToken, BalanceParams, CalendarEventParams, IntegrationError, Money, Operation,
    ProviderKind, PushPaymentParams, SecretString, TokenGrant, TransactionHandle,
};

pub use descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
pub use flutterwave::FlutterwaveAdapter;
pub use google_calendar::GoogleCalendarAdapter;
pub use mpesa::MpesaAdapter;
pub use paypal::PaypalAdapter;
pub use paystack::PaystackAdapter;
pub use registry::ProviderRegistry;
pub use stripe::StripeAdapter;

/// Token used for the calls of a single integration flow. Never retained
/// past that flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: AccessToken,
}

impl ProviderSession {
    pub fn new(access_token: impl Into<AccessToken>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

fn unsupported(provider: ProviderKind, operation: Operation) -> IntegrationError {
    IntegrationError::UnsupportedOperation {
        provider,
        operation,
    }
}

/// Capability contract shared by every provider.
///
/// Operations a provider does not offer keep the default body and fail with
/// `UnsupportedOperation`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn kind(&self) -> ProviderKind {
        self.descriptor().kind
    }

    /// Obtain a session from process-wide service credentials.
    async fn authenticate(&self) -> Result<ProviderSession, IntegrationError> {
        Err(IntegrationError::configuration(format!(
            "{} has no service credentials; it needs a connected user",
            self.kind()
        )))
    }

    /// Available balance in major units.
    async fn query_balance(
        &self,
        _session: &ProviderSession,
        _params: &BalanceParams,
    ) -> Result<Money, IntegrationError> {
        Err(unsupported(self.kind(), Operation::QueryBalance))
    }

    async fn push_payment(
        &self,
        _session: &ProviderSession,
        _params: &PushPaymentParams,
    ) -> Result<TransactionHandle, IntegrationError> {
        Err(unsupported(self.kind(), Operation::PushPayment))
    }

    /// Returns the provider-assigned event id.
    async fn write_calendar_event(
        &self,
        _session: &ProviderSession,
        _params: &CalendarEventParams,
    ) -> Result<String, IntegrationError> {
        Err(unsupported(self.kind(), Operation::WriteCalendarEvent))
    }

    /// OAuth authorization-code support, for providers with per-user credentials.
    fn oauth(&self) -> Option<&dyn OAuthProvider> {
        None
    }
}

/// OAuth2 authorization-code and refresh-token grants
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> Result<String, IntegrationError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, IntegrationError>;

    /// A refused refresh token surfaces as `ReauthorizationRequired`.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, IntegrationError>;
}
