//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

use super::middleware::RequestUser;
use super::AppState;
use crate::domain::{
    Amount, BalanceParams, CalendarEventParams, CurrencyCode, IntegrationRequest,
    IntegrationResult, OperationContext, ProviderKind, PushPaymentParams, TransactionHandle,
};
use crate::error::{AppError, AppResult};
use crate::oauth::{AuthorizationRequest, ConnectionStatus};
use crate::payments::{MpesaCallbackEnvelope, PaymentStatus, PaymentTransaction};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when the user declines consent
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectedResponse {
    pub provider: ProviderKind,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub provider: ProviderKind,
    pub disconnected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CalendarEventRequest {
    pub title: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEventResponse {
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub provider: ProviderKind,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StkPushRequest {
    pub phone_number: String,
    pub amount: String,
    pub account_reference: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushResponse {
    #[serde(flatten)]
    pub handle: TransactionHandle,
    pub status: PaymentStatus,
}

// =========================================================================
// API Router
// =========================================================================

/// Routes for a session-bound user
pub fn create_router() -> Router<AppState> {
    Router::new()
        // OAuth connections
        .route("/integrations/:provider/authorize", get(authorize))
        .route("/integrations/:provider/status", get(connection_status))
        .route("/integrations/:provider", axum::routing::delete(disconnect))
        // Calendar
        .route("/calendar/events", post(create_calendar_event))
        // Balances
        .route("/payments/balance/:provider", get(provider_balance))
        .route("/payments/card-balance", get(card_balance))
        // Push payments
        .route("/payments/mpesa/stk-push", post(stk_push))
        .route(
            "/payments/transactions/:provider/:correlation_id",
            get(get_transaction),
        )
}

/// Provider redirects and webhooks
pub fn create_public_router() -> Router<AppState> {
    Router::new()
        .route("/integrations/:provider/callback", get(oauth_callback))
        .route("/payments/mpesa/callback", post(mpesa_callback))
}

// =========================================================================
// Helpers
// =========================================================================

fn parse_provider(raw: &str) -> AppResult<ProviderKind> {
    raw.parse()
        .map_err(|e: crate::domain::UnknownProvider| AppError::NotFound(e.to_string()))
}

fn parse_currency(raw: Option<&str>) -> AppResult<Option<CurrencyCode>> {
    raw.map(CurrencyCode::new)
        .transpose()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

fn parse_decimal(field: &str, raw: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|_| AppError::InvalidRequest(format!("{} is not a decimal number", field)))
}

fn unexpected(result: IntegrationResult) -> AppError {
    AppError::Internal(format!("unexpected integration result: {:?}", result))
}

async fn balance(
    state: &AppState,
    user_id: Uuid,
    provider: ProviderKind,
    query: BalanceQuery,
) -> AppResult<Json<BalanceResponse>> {
    let params = BalanceParams {
        currency: parse_currency(query.currency.as_deref())?,
    };

    match state
        .orchestrator
        .execute(IntegrationRequest::query_balance(user_id, provider, params))
        .await?
    {
        IntegrationResult::Balance(money) => Ok(Json(BalanceResponse {
            provider,
            amount: money.amount,
            currency: money.currency,
        })),
        other => Err(unexpected(other)),
    }
}

// =========================================================================
// OAuth connections
// =========================================================================

/// GET /integrations/:provider/authorize
async fn authorize(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(provider): Path<String>,
) -> AppResult<Json<AuthorizationRequest>> {
    let provider = parse_provider(&provider)?;
    let request = state.connections.authorization_url(user.user_id, provider)?;
    Ok(Json(request))
}

/// GET /integrations/:provider/callback
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> AppResult<Json<ConnectedResponse>> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = query.error {
        return Err(AppError::InvalidRequest(format!(
            "authorization was not granted: {}",
            error
        )));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(AppError::InvalidRequest(
            "code and state are required".to_string(),
        ));
    };

    state
        .connections
        .complete_authorization(provider, &code, &oauth_state)
        .await?;

    Ok(Json(ConnectedResponse {
        provider,
        connected: true,
    }))
}

/// GET /integrations/:provider/status
async fn connection_status(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(provider): Path<String>,
) -> AppResult<Json<ConnectionStatus>> {
    let provider = parse_provider(&provider)?;
    Ok(Json(state.connections.status(user.user_id, provider).await?))
}

/// DELETE /integrations/:provider
async fn disconnect(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(provider): Path<String>,
) -> AppResult<Json<DisconnectResponse>> {
    let provider = parse_provider(&provider)?;
    let disconnected = state.connections.disconnect(user.user_id, provider).await?;
    Ok(Json(DisconnectResponse {
        provider,
        disconnected,
    }))
}

// =========================================================================
// Calendar
// =========================================================================

/// POST /calendar/events
async fn create_calendar_event(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(ctx): Extension<OperationContext>,
    Json(req): Json<CalendarEventRequest>,
) -> AppResult<(StatusCode, Json<CalendarEventResponse>)> {
    if req.title.trim().is_empty() {
        return Err(AppError::InvalidRequest("title is required".to_string()));
    }

    let mut params = CalendarEventParams::billing_reminder(req.title.trim(), req.starts_at);
    if let Some(amount) = req.amount.as_deref() {
        let currency = parse_currency(req.currency.as_deref())?.unwrap_or(CurrencyCode::KES);
        params = params.with_amount(parse_decimal("amount", amount)?, currency);
    }
    if let Some(description) = req.description {
        params = params.with_description(description);
    }

    tracing::debug!(
        user_id = %user.user_id,
        correlation_id = %ctx.correlation_id,
        "Creating billing reminder"
    );

    match state
        .orchestrator
        .execute(IntegrationRequest::write_calendar_event(
            user.user_id,
            ProviderKind::GoogleCalendar,
            params,
        ))
        .await?
    {
        IntegrationResult::EventCreated { event_id } => Ok((
            StatusCode::CREATED,
            Json(CalendarEventResponse { event_id }),
        )),
        other => Err(unexpected(other)),
    }
}

// =========================================================================
// Balances
// =========================================================================

/// GET /payments/balance/:provider
async fn provider_balance(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path(provider): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<BalanceResponse>> {
    let provider = parse_provider(&provider)?;
    balance(&state, user.user_id, provider, query).await
}

/// GET /payments/card-balance
async fn card_balance(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<BalanceResponse>> {
    let provider = state.orchestrator.registry().card_provider()?;
    balance(&state, user.user_id, provider, query).await
}

// =========================================================================
// Push payments
// =========================================================================

/// POST /payments/mpesa/stk-push
async fn stk_push(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Extension(ctx): Extension<OperationContext>,
    Json(req): Json<StkPushRequest>,
) -> AppResult<(StatusCode, Json<StkPushResponse>)> {
    if req.account_reference.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "account_reference is required".to_string(),
        ));
    }

    let amount = Amount::new(parse_decimal("amount", &req.amount)?)
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let params = PushPaymentParams {
        phone_number: req.phone_number,
        amount,
        account_reference: req.account_reference,
        description: req.description,
    };

    let handle = match state
        .orchestrator
        .execute(IntegrationRequest::push_payment(
            user.user_id,
            ProviderKind::Mpesa,
            params.clone(),
        ))
        .await?
    {
        IntegrationResult::PaymentInitiated(handle) => handle,
        other => return Err(unexpected(other)),
    };

    // The payment is already in flight; a callback will still record it
    let status = match state
        .payments
        .record_initiated(user.user_id, &handle, &params, CurrencyCode::KES)
        .await
    {
        Ok(transaction) => transaction.status,
        Err(e) => {
            tracing::error!(
                error = %e,
                correlation_id = %ctx.correlation_id,
                checkout_request_id = %handle.correlation_id,
                "Failed to record initiated payment"
            );
            PaymentStatus::Pending
        }
    };

    Ok((StatusCode::ACCEPTED, Json(StkPushResponse { handle, status })))
}

/// POST /payments/mpesa/callback
async fn mpesa_callback(
    State(state): State<AppState>,
    Json(envelope): Json<MpesaCallbackEnvelope>,
) -> AppResult<Json<Value>> {
    state.payments.handle_mpesa_callback(envelope).await?;

    Ok(Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Accepted"
    })))
}

/// GET /payments/transactions/:provider/:correlation_id
async fn get_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<RequestUser>,
    Path((provider, correlation_id)): Path<(String, String)>,
) -> AppResult<Json<PaymentTransaction>> {
    let provider = parse_provider(&provider)?;

    state
        .payments
        .find_for_user(user.user_id, provider, &correlation_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", correlation_id)))
}
