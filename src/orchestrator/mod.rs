//! Integration Orchestrator
//!
//! Routes a logical integration request to the adapter for its provider,
//! with a valid session, under the configured time bound.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProviderTimeouts;
use crate::domain::{
    IntegrationError, IntegrationFailure, IntegrationRequest, IntegrationResult, OperationParams,
    ProviderKind,
};
use crate::oauth::TokenRefreshManager;
use crate::providers::{CredentialSource, ProviderAdapter, ProviderRegistry, ProviderSession};

pub struct IntegrationOrchestrator {
    registry: Arc<ProviderRegistry>,
    tokens: Arc<TokenRefreshManager>,
    timeouts: ProviderTimeouts,
}

impl IntegrationOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        tokens: Arc<TokenRefreshManager>,
        timeouts: ProviderTimeouts,
    ) -> Self {
        Self {
            registry,
            tokens,
            timeouts,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Execute one integration request.
    ///
    /// Nothing is retried. An operation the provider does not support fails
    /// before any credential lookup or network call.
    pub async fn execute(
        &self,
        request: IntegrationRequest,
    ) -> Result<IntegrationResult, IntegrationFailure> {
        let provider = request.provider;
        let operation = request.operation();
        let started = Instant::now();

        let result = self.dispatch(request).await;

        match &result {
            Ok(_) => tracing::info!(
                provider = %provider,
                operation = %operation,
                duration_ms = %started.elapsed().as_millis(),
                "Integration request completed"
            ),
            Err(e) => tracing::warn!(
                provider = %provider,
                operation = %operation,
                duration_ms = %started.elapsed().as_millis(),
                retryable = e.is_retryable(),
                error = %e,
                "Integration request failed"
            ),
        }

        result.map_err(|error| IntegrationFailure::new(provider, operation, error))
    }

    async fn dispatch(
        &self,
        request: IntegrationRequest,
    ) -> Result<IntegrationResult, IntegrationError> {
        let operation = request.operation();
        let adapter = self.registry.get(request.provider)?;

        if !adapter.descriptor().supports(operation) {
            return Err(IntegrationError::UnsupportedOperation {
                provider: request.provider,
                operation,
            });
        }

        let session = self.session(adapter.as_ref(), &request).await?;
        let bound = self.timeouts.for_operation(operation);

        // The call runs on its own task so that a timed-out call can still
        // finish; its result is then dropped.
        let task = tokio::spawn(run(adapter, session, request.params));

        match tokio::time::timeout(bound, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(error = %join_error, "Provider call task aborted");
                Err(IntegrationError::transient(
                    request.provider,
                    "provider call aborted",
                ))
            }
            Err(_) => Err(IntegrationError::timeout(request.provider, bound)),
        }
    }

    async fn session(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &IntegrationRequest,
    ) -> Result<ProviderSession, IntegrationError> {
        match adapter.descriptor().credential_source {
            CredentialSource::User => {
                let token = self
                    .tokens
                    .get_valid_access_token(request.user_id, request.provider)
                    .await?;
                Ok(ProviderSession::new(token))
            }
            CredentialSource::Service => {
                bounded(request.provider, self.timeouts.auth, adapter.authenticate()).await
            }
        }
    }
}

async fn run(
    adapter: Arc<dyn ProviderAdapter>,
    session: ProviderSession,
    params: OperationParams,
) -> Result<IntegrationResult, IntegrationError> {
    match params {
        OperationParams::QueryBalance(params) => adapter
            .query_balance(&session, &params)
            .await
            .map(IntegrationResult::Balance),
        OperationParams::PushPayment(params) => adapter
            .push_payment(&session, &params)
            .await
            .map(IntegrationResult::PaymentInitiated),
        OperationParams::WriteCalendarEvent(params) => adapter
            .write_calendar_event(&session, &params)
            .await
            .map(|event_id| IntegrationResult::EventCreated { event_id }),
    }
}

async fn bounded<T>(
    provider: ProviderKind,
    bound: Duration,
    call: impl std::future::Future<Output = Result<T, IntegrationError>>,
) -> Result<T, IntegrationError> {
    tokio::time::timeout(bound, call)
        .await
        .unwrap_or_else(|_| Err(IntegrationError::timeout(provider, bound)))
}
