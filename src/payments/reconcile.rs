//! Reconciliation of asynchronous payment confirmations

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    MpesaCallbackEnvelope, PaymentStoreError, PaymentTransaction, PaymentTransactionStore,
    PendingPayment, ReconcileOutcome,
};
use crate::domain::{CurrencyCode, ProviderKind, PushPaymentParams, TransactionHandle};
use crate::providers::mpesa::normalize_phone_number;

pub struct ReconciliationService {
    store: Arc<dyn PaymentTransactionStore>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn PaymentTransactionStore>) -> Self {
        Self { store }
    }

    /// Record a push payment the provider has accepted.
    pub async fn record_initiated(
        &self,
        user_id: Uuid,
        handle: &TransactionHandle,
        params: &PushPaymentParams,
        currency: CurrencyCode,
    ) -> Result<PaymentTransaction, PaymentStoreError> {
        let pending = PendingPayment {
            user_id,
            handle: handle.clone(),
            amount: params.amount.value(),
            currency,
            phone_number: charged_phone_number(handle.provider, &params.phone_number),
            account_reference: params.account_reference.clone(),
            initiated_at: Utc::now(),
        };

        let transaction = self.store.record_initiated(&pending).await?;

        tracing::info!(
            user_id = %user_id,
            provider = %handle.provider,
            correlation_id = %handle.correlation_id,
            status = %transaction.status,
            "Recorded initiated payment"
        );

        Ok(transaction)
    }

    pub async fn handle_mpesa_callback(
        &self,
        envelope: MpesaCallbackEnvelope,
    ) -> Result<ReconcileOutcome, PaymentStoreError> {
        let confirmation = envelope.into_confirmation(Utc::now());
        let outcome = self.store.apply_confirmation(&confirmation).await?;

        match outcome {
            ReconcileOutcome::Reconciled(status) => tracing::info!(
                correlation_id = %confirmation.correlation_id,
                status = %status,
                result_code = confirmation.result_code,
                "Payment confirmation reconciled"
            ),
            ReconcileOutcome::RecordedBeforeInitiation => tracing::warn!(
                correlation_id = %confirmation.correlation_id,
                status = %confirmation.status,
                "Payment confirmation arrived before its pending record"
            ),
            ReconcileOutcome::Duplicate => tracing::debug!(
                correlation_id = %confirmation.correlation_id,
                "Duplicate payment confirmation ignored"
            ),
        }

        Ok(outcome)
    }

    /// Transaction owned by `user_id`. Transactions of other users, and
    /// those whose initiation was never recorded, are not visible.
    pub async fn find_for_user(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentStoreError> {
        let transaction = self.store.find(provider, correlation_id).await?;
        Ok(transaction.filter(|t| t.user_id == Some(user_id)))
    }
}

/// The number the provider was actually asked to charge.
fn charged_phone_number(provider: ProviderKind, raw: &str) -> String {
    match provider {
        ProviderKind::Mpesa => normalize_phone_number(raw).unwrap_or_else(|| raw.to_string()),
        _ => raw.to_string(),
    }
}
