//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::oauth::ConnectionService;
use crate::orchestrator::IntegrationOrchestrator;
use crate::payments::ReconciliationService;

pub use routes::{create_public_router, create_router};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<IntegrationOrchestrator>,
    pub connections: Arc<ConnectionService>,
    pub payments: Arc<ReconciliationService>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<IntegrationOrchestrator>,
        connections: Arc<ConnectionService>,
        payments: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            orchestrator,
            connections,
            payments,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: logging -> user context -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn(middleware::user_context_middleware));

    // Provider redirects and webhooks carry no user header
    let api_routes = protected_routes
        .merge(create_public_router())
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
