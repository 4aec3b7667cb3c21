//! Integration requests and results
//!
//! A logical operation against one provider, built per call by the HTTP
//! layer and never persisted.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::amount::{Amount, CurrencyCode, Money};
use super::credential::ProviderKind;

/// Operations a provider may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    QueryBalance,
    PushPayment,
    WriteCalendarEvent,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::QueryBalance => "query_balance",
            Operation::PushPayment => "push_payment",
            Operation::WriteCalendarEvent => "write_calendar_event",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceParams {
    /// Preferred currency when the provider reports several balances
    pub currency: Option<CurrencyCode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPaymentParams {
    pub phone_number: String,
    pub amount: Amount,
    pub account_reference: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEventParams {
    pub title: String,
    pub amount: Option<Decimal>,
    pub currency: CurrencyCode,
    pub starts_at: DateTime<Utc>,
    pub duration: Duration,
    pub description: Option<String>,
}

impl CalendarEventParams {
    /// A one-hour billing reminder for a subscription.
    pub fn billing_reminder(title: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            amount: None,
            currency: CurrencyCode::KES,
            starts_at,
            duration: Duration::hours(1),
            description: None,
        }
    }

    pub fn with_amount(mut self, amount: Decimal, currency: CurrencyCode) -> Self {
        self.amount = Some(amount);
        self.currency = currency;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + self.duration
    }
}

/// Operation-specific parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationParams {
    QueryBalance(BalanceParams),
    PushPayment(PushPaymentParams),
    WriteCalendarEvent(CalendarEventParams),
}

impl OperationParams {
    pub fn operation(&self) -> Operation {
        match self {
            OperationParams::QueryBalance(_) => Operation::QueryBalance,
            OperationParams::PushPayment(_) => Operation::PushPayment,
            OperationParams::WriteCalendarEvent(_) => Operation::WriteCalendarEvent,
        }
    }
}

/// A caller's logical request against one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationRequest {
    pub user_id: Uuid,
    pub provider: ProviderKind,
    pub params: OperationParams,
}

impl IntegrationRequest {
    pub fn new(user_id: Uuid, provider: ProviderKind, params: OperationParams) -> Self {
        Self {
            user_id,
            provider,
            params,
        }
    }

    pub fn query_balance(user_id: Uuid, provider: ProviderKind, params: BalanceParams) -> Self {
        Self::new(user_id, provider, OperationParams::QueryBalance(params))
    }

    pub fn push_payment(user_id: Uuid, provider: ProviderKind, params: PushPaymentParams) -> Self {
        Self::new(user_id, provider, OperationParams::PushPayment(params))
    }

    pub fn write_calendar_event(
        user_id: Uuid,
        provider: ProviderKind,
        params: CalendarEventParams,
    ) -> Self {
        Self::new(user_id, provider, OperationParams::WriteCalendarEvent(params))
    }

    pub fn operation(&self) -> Operation {
        self.params.operation()
    }
}

/// Provider handle for an initiated payment.
///
/// `correlation_id` is what the provider echoes back in its asynchronous
/// confirmation (M-Pesa `CheckoutRequestID`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub provider: ProviderKind,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

/// Normalized outcome of a successful integration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrationResult {
    Balance(Money),
    PaymentInitiated(TransactionHandle),
    EventCreated { event_id: String },
}
