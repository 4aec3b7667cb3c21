//! Postgres payment store
//!
//! Rows live in `payment_transactions`, keyed by (provider, correlation_id).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    PaymentConfirmation, PaymentStatus, PaymentStoreError, PaymentTransaction,
    PaymentTransactionStore, PendingPayment, ReconcileOutcome,
};
use crate::domain::{CurrencyCode, ProviderKind};

const COLUMNS: &str = r#"
    provider, correlation_id, merchant_request_id, user_id, amount, currency,
    phone_number, account_reference, status, result_code, result_desc,
    receipt_number, initiated_at, confirmed_at, updated_at
"#;

type TransactionRow = (
    String,
    String,
    Option<String>,
    Option<Uuid>,
    Option<Decimal>,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn from_row(row: TransactionRow) -> Result<PaymentTransaction, PaymentStoreError> {
    let (
        provider,
        correlation_id,
        merchant_request_id,
        user_id,
        amount,
        currency,
        phone_number,
        account_reference,
        status,
        result_code,
        result_desc,
        receipt_number,
        initiated_at,
        confirmed_at,
        updated_at,
    ) = row;

    let corrupt = |reason: String| PaymentStoreError::Corrupt {
        correlation_id: correlation_id.clone(),
        reason,
    };

    let provider: ProviderKind = provider.parse().map_err(|e| corrupt(format!("{}", e)))?;
    let currency = CurrencyCode::new(&currency).map_err(|e| corrupt(e.to_string()))?;
    let status: PaymentStatus = status.parse().map_err(corrupt)?;

    Ok(PaymentTransaction {
        provider,
        correlation_id,
        merchant_request_id,
        user_id,
        amount,
        currency,
        phone_number,
        account_reference,
        status,
        result_code,
        result_desc,
        receipt_number,
        initiated_at,
        confirmed_at,
        updated_at,
    })
}

/// Repository for payment transactions
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentTransactionStore for PgPaymentStore {
    async fn record_initiated(
        &self,
        pending: &PendingPayment,
    ) -> Result<PaymentTransaction, PaymentStoreError> {
        // A confirmation may have created the row already; keep its outcome
        let sql = format!(
            r#"
            INSERT INTO payment_transactions (
                provider, correlation_id, merchant_request_id, user_id, amount, currency,
                phone_number, account_reference, status, initiated_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9)
            ON CONFLICT (provider, correlation_id) DO UPDATE SET
                merchant_request_id = COALESCE(payment_transactions.merchant_request_id, EXCLUDED.merchant_request_id),
                user_id = COALESCE(payment_transactions.user_id, EXCLUDED.user_id),
                amount = COALESCE(payment_transactions.amount, EXCLUDED.amount),
                phone_number = COALESCE(payment_transactions.phone_number, EXCLUDED.phone_number),
                account_reference = COALESCE(payment_transactions.account_reference, EXCLUDED.account_reference),
                initiated_at = COALESCE(payment_transactions.initiated_at, EXCLUDED.initiated_at)
            RETURNING {}
            "#,
            COLUMNS
        );

        let row: TransactionRow = sqlx::query_as(&sql)
            .bind(pending.handle.provider.as_str())
            .bind(&pending.handle.correlation_id)
            .bind(&pending.handle.merchant_request_id)
            .bind(pending.user_id)
            .bind(pending.amount)
            .bind(pending.currency.as_str())
            .bind(&pending.phone_number)
            .bind(&pending.account_reference)
            .bind(pending.initiated_at)
            .fetch_one(&self.pool)
            .await?;

        from_row(row)
    }

    async fn apply_confirmation(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<ReconcileOutcome, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;

        let outcome = match locked_status(&mut tx, confirmation).await? {
            Some(status) => confirm_existing(&mut tx, confirmation, status).await?,
            None if insert_confirmation(&mut tx, confirmation).await? => {
                ReconcileOutcome::RecordedBeforeInitiation
            }
            // The conflicting row was committed after the select
            None => match locked_status(&mut tx, confirmation).await? {
                Some(status) => confirm_existing(&mut tx, confirmation, status).await?,
                None => ReconcileOutcome::Duplicate,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find(
        &self,
        provider: ProviderKind,
        correlation_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentStoreError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE provider = $1 AND correlation_id = $2",
            COLUMNS
        );

        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(provider.as_str())
            .bind(correlation_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(from_row).transpose()
    }

    async fn expire_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, PaymentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'pending' AND initiated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn locked_status(
    conn: &mut PgConnection,
    confirmation: &PaymentConfirmation,
) -> Result<Option<PaymentStatus>, PaymentStoreError> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT status FROM payment_transactions
        WHERE provider = $1 AND correlation_id = $2
        FOR UPDATE
        "#,
    )
    .bind(confirmation.provider.as_str())
    .bind(&confirmation.correlation_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(status,)| {
        status.parse().map_err(|reason| PaymentStoreError::Corrupt {
            correlation_id: confirmation.correlation_id.clone(),
            reason,
        })
    })
    .transpose()
}

/// Insert an ownerless confirmed row. Returns false when the key already exists.
async fn insert_confirmation(
    conn: &mut PgConnection,
    confirmation: &PaymentConfirmation,
) -> Result<bool, PaymentStoreError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO payment_transactions (
            provider, correlation_id, merchant_request_id, amount, currency,
            phone_number, status, result_code, result_desc, receipt_number,
            confirmed_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        ON CONFLICT (provider, correlation_id) DO NOTHING
        "#,
    )
    .bind(confirmation.provider.as_str())
    .bind(&confirmation.correlation_id)
    .bind(&confirmation.merchant_request_id)
    .bind(confirmation.amount)
    .bind(confirmation.currency.as_str())
    .bind(&confirmation.phone_number)
    .bind(confirmation.status.as_str())
    .bind(confirmation.result_code)
    .bind(&confirmation.result_desc)
    .bind(&confirmation.receipt_number)
    .bind(confirmation.received_at)
    .execute(&mut *conn)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

async fn confirm_existing(
    conn: &mut PgConnection,
    confirmation: &PaymentConfirmation,
    current: PaymentStatus,
) -> Result<ReconcileOutcome, PaymentStoreError> {
    if current.is_confirmed() {
        return Ok(ReconcileOutcome::Duplicate);
    }

    sqlx::query(
        r#"
        UPDATE payment_transactions SET
            status = $3,
            result_code = $4,
            result_desc = $5,
            merchant_request_id = COALESCE($6, merchant_request_id),
            receipt_number = COALESCE($7, receipt_number),
            amount = COALESCE($8, amount),
            phone_number = COALESCE($9, phone_number),
            confirmed_at = $10,
            updated_at = $10
        WHERE provider = $1 AND correlation_id = $2
        "#,
    )
    .bind(confirmation.provider.as_str())
    .bind(&confirmation.correlation_id)
    .bind(confirmation.status.as_str())
    .bind(confirmation.result_code)
    .bind(&confirmation.result_desc)
    .bind(&confirmation.merchant_request_id)
    .bind(&confirmation.receipt_number)
    .bind(confirmation.amount)
    .bind(&confirmation.phone_number)
    .bind(confirmation.received_at)
    .execute(&mut *conn)
    .await?;

    Ok(ReconcileOutcome::Reconciled(confirmation.status))
}
