//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use subscription_tracker::api::AppState;
use subscription_tracker::config::ProviderTimeouts;
use subscription_tracker::credential_store::{CredentialStore, MemoryCredentialStore};
use subscription_tracker::domain::{
    BalanceParams, CalendarEventParams, Credential, CurrencyCode, IntegrationError, Money,
    Operation, ProviderKind, PushPaymentParams, SecretString, TokenGrant, TransactionHandle,
};
use subscription_tracker::oauth::{ConnectionService, OAuthStateSigner, TokenRefreshManager};
use subscription_tracker::orchestrator::IntegrationOrchestrator;
use subscription_tracker::payments::{MemoryPaymentStore, ReconciliationService};
use subscription_tracker::providers::{
    AuthScheme, CredentialSource, CurrencyUnits, OAuthProvider, ProviderAdapter,
    ProviderDescriptor, ProviderRegistry, ProviderSession,
};

pub const STATE_SECRET: &str = "integration-test-secret";

/// Adapter that records every call and answers from canned values
pub struct StubAdapter {
    descriptor: ProviderDescriptor,
    delay: Duration,
    balance_minor: i64,
    pub auth_calls: AtomicUsize,
    pub operation_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub completed_calls: AtomicUsize,
}

impl StubAdapter {
    fn new(
        kind: ProviderKind,
        credential_source: CredentialSource,
        units: Option<CurrencyUnits>,
        operations: &'static [Operation],
    ) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                kind,
                display_name: "Stub",
                base_url: "http://stub.invalid".to_string(),
                auth_scheme: AuthScheme::Bearer,
                credential_source,
                units,
                operations,
            },
            delay: Duration::ZERO,
            balance_minor: 0,
            auth_calls: AtomicUsize::new(0),
            operation_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            completed_calls: AtomicUsize::new(0),
        }
    }

    /// User-credential calendar provider
    pub fn calendar() -> Self {
        Self::new(
            ProviderKind::GoogleCalendar,
            CredentialSource::User,
            None,
            &[Operation::WriteCalendarEvent],
        )
    }

    /// Service-credential push payment provider
    pub fn mpesa() -> Self {
        Self::new(
            ProviderKind::Mpesa,
            CredentialSource::Service,
            Some(CurrencyUnits {
                currency: CurrencyCode::KES,
                minor_unit_exponent: 0,
            }),
            &[Operation::PushPayment],
        )
    }

    /// Card processor reporting balances in kobo
    pub fn paystack(balance_minor: i64) -> Self {
        let mut stub = Self::new(
            ProviderKind::Paystack,
            CredentialSource::Service,
            Some(CurrencyUnits {
                currency: CurrencyCode::NGN,
                minor_unit_exponent: 2,
            }),
            &[Operation::QueryBalance],
        );
        stub.balance_minor = balance_minor;
        stub
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn network_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
            + self.operation_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn operation(&self) {
        self.operation_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn authenticate(&self) -> Result<ProviderSession, IntegrationError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderSession::new("service-token"))
    }

    async fn query_balance(
        &self,
        _session: &ProviderSession,
        _params: &BalanceParams,
    ) -> Result<Money, IntegrationError> {
        self.operation().await;
        let units = self.descriptor.units.ok_or_else(|| {
            IntegrationError::configuration("stub has no currency units")
        })?;
        Money::from_minor_units(self.balance_minor, units.minor_unit_exponent, units.currency)
            .map_err(|e| IntegrationError::rejected(self.kind(), None, e.to_string()))
    }

    async fn push_payment(
        &self,
        _session: &ProviderSession,
        params: &PushPaymentParams,
    ) -> Result<TransactionHandle, IntegrationError> {
        self.operation().await;
        Ok(TransactionHandle {
            provider: self.kind(),
            correlation_id: format!("ws_CO_{}", params.account_reference),
            merchant_request_id: Some("29115-1".to_string()),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }

    async fn write_calendar_event(
        &self,
        session: &ProviderSession,
        params: &CalendarEventParams,
    ) -> Result<String, IntegrationError> {
        self.operation().await;
        if session.access_token.expose() == "revoked" {
            return Err(IntegrationError::ReauthorizationRequired {
                provider: self.kind(),
            });
        }
        Ok(format!("evt_{}", params.title.to_lowercase()))
    }

    fn oauth(&self) -> Option<&dyn OAuthProvider> {
        match self.descriptor.credential_source {
            CredentialSource::User => Some(self),
            CredentialSource::Service => None,
        }
    }
}

#[async_trait]
impl OAuthProvider for StubAdapter {
    fn authorization_url(&self, state: &str) -> Result<String, IntegrationError> {
        Ok(format!("https://accounts.example.com/auth?state={}", state))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, IntegrationError> {
        Ok(TokenGrant {
            access_token: SecretString::from(format!("access-{}", code)),
            refresh_token: Some(SecretString::from("refresh-token")),
            expires_in: Some(3600),
        })
    }

    async fn refresh(&self, _refresh_token: &SecretString) -> Result<TokenGrant, IntegrationError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenGrant {
            access_token: SecretString::from("refreshed-token"),
            refresh_token: None,
            expires_in: Some(3600),
        })
    }
}

/// Fully wired services over in-memory stores
pub struct TestApp {
    pub state: AppState,
    pub credentials: Arc<MemoryCredentialStore>,
    pub payments: Arc<MemoryPaymentStore>,
    pub orchestrator: Arc<IntegrationOrchestrator>,
}

pub fn timeouts(bound: Duration) -> ProviderTimeouts {
    ProviderTimeouts {
        auth: bound,
        balance: bound,
        payment: bound,
        calendar: bound,
    }
}

pub fn build(registry: ProviderRegistry, timeouts: ProviderTimeouts) -> TestApp {
    let registry = Arc::new(registry);
    let credentials = Arc::new(MemoryCredentialStore::new());
    let payments = Arc::new(MemoryPaymentStore::new());

    let tokens = Arc::new(TokenRefreshManager::new(
        credentials.clone(),
        registry.clone(),
        Duration::from_secs(300),
    ));
    let orchestrator = Arc::new(IntegrationOrchestrator::new(
        registry.clone(),
        tokens,
        timeouts,
    ));
    let connections = Arc::new(ConnectionService::new(
        credentials.clone(),
        registry,
        OAuthStateSigner::new(&SecretString::from(STATE_SECRET)).unwrap(),
    ));
    let reconciliation = Arc::new(ReconciliationService::new(payments.clone()));

    TestApp {
        state: AppState::new(orchestrator.clone(), connections, reconciliation),
        credentials,
        payments,
        orchestrator,
    }
}

/// Store a calendar credential expiring `expires_in` from now
pub async fn connect_calendar(
    store: &MemoryCredentialStore,
    user_id: Uuid,
    access_token: &str,
    expires_in: ChronoDuration,
) -> Credential {
    let credential = Credential {
        user_id,
        provider: ProviderKind::GoogleCalendar,
        access_token: SecretString::from(access_token),
        refresh_token: Some(SecretString::from("refresh-token")),
        expires_at: Some(Utc::now() + expires_in),
    };
    store.save(&credential).await.unwrap();
    credential
}

pub fn decimal(value: &str) -> Decimal {
    value.parse().unwrap()
}

/// Connect to DATABASE_URL and empty the integration tables
pub async fn setup_test_db() -> sqlx::PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE provider_credentials, payment_transactions")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
