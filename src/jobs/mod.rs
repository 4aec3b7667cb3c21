//! Scheduled Jobs
//!
//! Periodic maintenance for payment transactions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::payments::{PaymentStoreError, PaymentTransactionStore};

// =========================================================================
// Pending Payment Expiry
// =========================================================================

/// Expire pending payments that never received a provider callback.
pub async fn expire_stale_pending_payments(
    store: &dyn PaymentTransactionStore,
    ttl: Duration,
) -> Result<u64, JobError> {
    let cutoff = expiry_cutoff(Utc::now(), ttl)?;
    let rows_affected = store.expire_pending(cutoff).await?;

    if rows_affected > 0 {
        tracing::warn!(
            rows_affected = rows_affected,
            cutoff = %cutoff,
            "Expired pending payments without confirmation"
        );
    }

    Ok(rows_affected)
}

fn expiry_cutoff(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, JobError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .ok_or(JobError::InvalidTtl(ttl))
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between expiry sweeps (default: 1 minute)
    pub pending_expiry_interval: Duration,
    /// Age after which a pending payment expires (default: 30 minutes)
    pub pending_payment_ttl: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            pending_expiry_interval: Duration::from_secs(60),
            pending_payment_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    payments: Arc<dyn PaymentTransactionStore>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(payments: Arc<dyn PaymentTransactionStore>) -> Self {
        Self {
            payments,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(payments: Arc<dyn PaymentTransactionStore>, config: JobSchedulerConfig) -> Self {
        Self { payments, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            ttl_secs = self.config.pending_payment_ttl.as_secs(),
            "Job scheduler started"
        );

        let mut expiry_interval = interval(self.config.pending_expiry_interval);

        loop {
            expiry_interval.tick().await;
            if let Err(e) =
                expire_stale_pending_payments(self.payments.as_ref(), self.config.pending_payment_ttl)
                    .await
            {
                tracing::error!(error = %e, "Pending payment expiry failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match expire_stale_pending_payments(self.payments.as_ref(), self.config.pending_payment_ttl)
            .await
        {
            Ok(count) => report.pending_payments_expired = count,
            Err(e) => report.errors.push(format!("Pending payment expiry: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub pending_payments_expired: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Payment store error: {0}")]
    PaymentStore(#[from] PaymentStoreError),

    #[error("Pending payment TTL out of range: {0:?}")]
    InvalidTtl(Duration),
}

// =========================================================================
// Tests
// =========================================================================
