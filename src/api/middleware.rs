//! API Middleware
//!
//! Request user extraction and request logging.

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::OperationContext;

pub const USER_ID_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Session-bound user, set by the upstream session layer
#[derive(Debug, Clone, Copy)]
pub struct RequestUser {
    pub user_id: Uuid,
}

fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

// =========================================================================
// Request User Middleware
// =========================================================================

/// Require X-Request-User-Id and build the operation context
pub async fn user_context_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let user_id_str = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-Request-User-Id header",
                "missing_user_id",
            )
        })?;

    let user_id = Uuid::parse_str(user_id_str).map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            "Invalid X-Request-User-Id header format",
            "invalid_user_id",
        )
    })?;

    let context = OperationContext::new(user_id, correlation_id(&headers));

    request.extensions_mut().insert(RequestUser { user_id });
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    // Path only; OAuth callbacks carry the code and state in the query
    let path = request.uri().path().to_string();
    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = correlation_id(request.headers());

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        path = %path,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
