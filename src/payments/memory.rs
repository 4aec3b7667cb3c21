//! In-process payment store, used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    PaymentConfirmation, PaymentStatus, PaymentStoreError, PaymentTransaction,
    PaymentTransactionStore, PendingPayment, ReconcileOutcome,
};
use crate::domain::ProviderKind;

#[derive(Debug, Default)]
pub struct MemoryPaymentStore {
    transactions: RwLock<HashMap<(ProviderKind, String), PaymentTransaction>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentTransactionStore for MemoryPaymentStore {
    async fn record_initiated(
        &self,
        pending: &PendingPayment,
    ) -> Result<PaymentTransaction, PaymentStoreError> {
        let key = (pending.handle.provider, pending.handle.correlation_id.clone());
        let mut transactions = self.transactions.write().await;

        let transaction = transactions
            .entry(key)
            .and_modify(|existing| existing.attach_initiation(pending))
            .or_insert_with(|| PaymentTransaction::from_pending(pending));

        Ok(transaction.clone())
    }

    async fn apply_confirmation(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<ReconcileOutcome, PaymentStoreError> {
        let key = (confirmation.provider, confirmation.correlation_id.clone());
        let mut transactions = self.transactions.write().await;

        match transactions.get_mut(&key) {
            None => {
                transactions.insert(key, PaymentTransaction::from_confirmation(confirmation));
                Ok(ReconcileOutcome::RecordedBeforeInitiation)
            }
            Some(existing) if existing.status.is_confirmed() => Ok(ReconcileOutcome::Duplicate),
            Some(existing) => {
                existing.confirm(confirmation);
                Ok(ReconcileOutcome::Reconciled(confirmation.status))
            }
        }
    }

    async fn find(
        &self,
        provider: ProviderKind,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentStoreError> {
        Ok(self
            .transactions
            .read()
            .await
            .get(&(provider, correlation_id.to_string()))
            .cloned())
    }

    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, PaymentStoreError> {
        let now = Utc::now();
        let mut expired = 0;
        for transaction in self.transactions.write().await.values_mut() {
            let stale = transaction.status == PaymentStatus::Pending
                && transaction.initiated_at.is_some_and(|at| at < cutoff);
            if stale {
                transaction.status = PaymentStatus::Expired;
                transaction.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}
