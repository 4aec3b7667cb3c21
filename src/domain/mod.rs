//! Domain module
//!
//! Core domain types shared by the credential, provider and orchestration layers.

pub mod amount;
pub mod context;
pub mod credential;
pub mod error;
pub mod request;
pub mod secret;

pub use amount::{Amount, AmountError, CurrencyCode, Money, MoneyError};
pub use context::OperationContext;
pub use credential::{ConnectionState, Credential, ProviderKind, TokenGrant, UnknownProvider};
pub use error::{IntegrationError, IntegrationFailure};
pub use request::{
    BalanceParams, CalendarEventParams, IntegrationRequest, IntegrationResult, Operation,
    OperationParams, PushPaymentParams, TransactionHandle,
};
pub use secret::{AccessToken, SecretString};
