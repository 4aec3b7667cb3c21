//! Payment confirmations
//!
//! A push payment is accepted synchronously but confirmed later by a
//! provider callback, which may arrive before the pending record is written,
//! more than once, or never. Transactions are keyed by
//! (provider, correlation id).

mod callback;
mod memory;
mod reconcile;
mod repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{CurrencyCode, ProviderKind, TransactionHandle};

pub use callback::{CallbackBody, CallbackItem, CallbackMetadata, MpesaCallbackEnvelope, StkCallback};
pub use memory::MemoryPaymentStore;
pub use reconcile::ReconciliationService;
pub use repository::PgPaymentStore;

/// M-Pesa result code for a request cancelled by the customer
pub const MPESA_CANCELLED_BY_USER: i32 = 1032;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    /// No confirmation arrived within the pending TTL
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }

    /// Set by a provider confirmation; later confirmations are duplicates.
    /// `Expired` is not final: a late confirmation still wins.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    pub fn from_mpesa_result(result_code: i32) -> Self {
        match result_code {
            0 => PaymentStatus::Completed,
            MPESA_CANCELLED_BY_USER => PaymentStatus::Cancelled,
            _ => PaymentStatus::Failed,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Recorded when the provider accepts a push payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub user_id: Uuid,
    pub handle: TransactionHandle,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub phone_number: String,
    pub account_reference: String,
    pub initiated_at: DateTime<Utc>,
}

/// Provider-reported outcome of a payment, parsed from a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub provider: ProviderKind,
    pub correlation_id: String,
    pub merchant_request_id: Option<String>,
    pub status: PaymentStatus,
    pub result_code: i32,
    pub result_desc: String,
    pub receipt_number: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: CurrencyCode,
    pub phone_number: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentTransaction {
    pub provider: ProviderKind,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_request_id: Option<String>,
    /// None until the initiating request is recorded
    #[serde(skip)]
    pub user_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub currency: CurrencyCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_reference: Option<String>,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn from_pending(pending: &PendingPayment) -> Self {
        Self {
            provider: pending.handle.provider,
            correlation_id: pending.handle.correlation_id.clone(),
            merchant_request_id: pending.handle.merchant_request_id.clone(),
            user_id: Some(pending.user_id),
            amount: Some(pending.amount),
            currency: pending.currency,
            phone_number: Some(pending.phone_number.clone()),
            account_reference: Some(pending.account_reference.clone()),
            status: PaymentStatus::Pending,
            result_code: None,
            result_desc: None,
            receipt_number: None,
            initiated_at: Some(pending.initiated_at),
            confirmed_at: None,
            updated_at: pending.initiated_at,
        }
    }

    pub fn from_confirmation(confirmation: &PaymentConfirmation) -> Self {
        let mut transaction = Self {
            provider: confirmation.provider,
            correlation_id: confirmation.correlation_id.clone(),
            merchant_request_id: None,
            user_id: None,
            amount: None,
            currency: confirmation.currency,
            phone_number: None,
            account_reference: None,
            status: PaymentStatus::Pending,
            result_code: None,
            result_desc: None,
            receipt_number: None,
            initiated_at: None,
            confirmed_at: None,
            updated_at: confirmation.received_at,
        };
        transaction.confirm(confirmation);
        transaction
    }

    /// Fill in what the initiating request knows, keeping any outcome a
    /// confirmation already set.
    pub fn attach_initiation(&mut self, pending: &PendingPayment) {
        self.user_id = self.user_id.or(Some(pending.user_id));
        if self.merchant_request_id.is_none() {
            self.merchant_request_id = pending.handle.merchant_request_id.clone();
        }
        self.amount = self.amount.or(Some(pending.amount));
        if self.phone_number.is_none() {
            self.phone_number = Some(pending.phone_number.clone());
        }
        if self.account_reference.is_none() {
            self.account_reference = Some(pending.account_reference.clone());
        }
        self.initiated_at = self.initiated_at.or(Some(pending.initiated_at));
    }

    pub fn confirm(&mut self, confirmation: &PaymentConfirmation) {
        self.status = confirmation.status;
        self.result_code = Some(confirmation.result_code);
        self.result_desc = Some(confirmation.result_desc.clone());
        if confirmation.merchant_request_id.is_some() {
            self.merchant_request_id = confirmation.merchant_request_id.clone();
        }
        if confirmation.receipt_number.is_some() {
            self.receipt_number = confirmation.receipt_number.clone();
        }
        if confirmation.amount.is_some() {
            self.amount = confirmation.amount;
        }
        if confirmation.phone_number.is_some() {
            self.phone_number = confirmation.phone_number.clone();
        }
        self.confirmed_at = Some(confirmation.received_at);
        self.updated_at = confirmation.received_at;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Pending transaction moved to the confirmed status
    Reconciled(PaymentStatus),
    /// No pending record yet; the confirmation is kept until it arrives
    RecordedBeforeInitiation,
    /// Already confirmed; nothing changed
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored payment {correlation_id} is unreadable: {reason}")]
    Corrupt {
        correlation_id: String,
        reason: String,
    },
}

#[async_trait]
pub trait PaymentTransactionStore: Send + Sync {
    /// Insert a pending transaction, or attach initiation details to one a
    /// confirmation created first.
    async fn record_initiated(
        &self,
        pending: &PendingPayment,
    ) -> Result<PaymentTransaction, PaymentStoreError>;

    async fn apply_confirmation(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<ReconcileOutcome, PaymentStoreError>;

    async fn find(
        &self,
        provider: ProviderKind,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentStoreError>;

    /// Mark pending transactions initiated before `cutoff` as expired.
    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, PaymentStoreError>;
}
