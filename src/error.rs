//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{IntegrationError, IntegrationFailure};
use crate::oauth::ConnectionError;
use crate::payments::PaymentStoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid authorization state")]
    InvalidState,

    // Integration errors
    #[error(transparent)]
    Integration(#[from] IntegrationFailure),

    #[error(transparent)]
    Provider(#[from] IntegrationError),

    // Server errors (5xx)
    #[error("Payment store error: {0}")]
    PaymentStore(#[from] PaymentStoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ConnectionError> for AppError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::InvalidState(e) => {
                tracing::warn!(error = %e, "Rejected OAuth callback state");
                AppError::InvalidState
            }
            ConnectionError::Integration(e) => AppError::Provider(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Status, error code and detail for a classified integration error
fn integration_status(err: &IntegrationError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        // 409: the user has to link the provider (again)
        IntegrationError::NotConnected { provider } => {
            (StatusCode::CONFLICT, "not_connected", Some(provider.to_string()))
        }
        IntegrationError::ReauthorizationRequired { provider } => (
            StatusCode::CONFLICT,
            "reauthorization_required",
            Some(provider.to_string()),
        ),

        // 503/504: retry later
        IntegrationError::Transient { timed_out: true, .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "provider_timeout", None)
        }
        IntegrationError::Transient { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", None)
        }

        IntegrationError::ProviderRejected { message, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "provider_rejected",
            Some(message.clone()),
        ),
        IntegrationError::UnsupportedOperation { .. } => {
            (StatusCode::BAD_REQUEST, "unsupported_operation", None)
        }

        IntegrationError::Configuration(msg) => {
            tracing::error!("Provider configuration error: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", None)
        }
        IntegrationError::CredentialStore(msg) => {
            tracing::error!("Credential store error: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "credential_store_error", None)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state", None),

            // 404 Not Found
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", Some(what.clone()))
            }

            AppError::Integration(failure) => integration_status(&failure.error),
            AppError::Provider(err) => integration_status(err),

            // 500 Internal Server Error
            AppError::PaymentStore(e) => {
                tracing::error!("Payment store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "payment_store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        // Server-side details stay in the logs
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
