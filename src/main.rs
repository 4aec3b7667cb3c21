//! Subscription Tracker - integration backend
//!
//! Serves the calendar and payment provider integrations of the
//! subscription tracker: OAuth connections, balances, push payments and
//! billing reminders.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subscription_tracker::api::{self, AppState};
use subscription_tracker::credential_store::PgCredentialStore;
use subscription_tracker::jobs::{JobScheduler, JobSchedulerConfig};
use subscription_tracker::oauth::{ConnectionService, OAuthStateSigner, TokenRefreshManager};
use subscription_tracker::orchestrator::IntegrationOrchestrator;
use subscription_tracker::payments::{PgPaymentStore, ReconciliationService};
use subscription_tracker::providers::ProviderRegistry;
use subscription_tracker::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subscription_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting subscription tracker");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let payment_store = Arc::new(PgPaymentStore::new(pool.clone()));

    let tokens = Arc::new(TokenRefreshManager::new(
        credentials.clone(),
        registry.clone(),
        config.token_refresh_margin,
    ));
    let orchestrator = Arc::new(IntegrationOrchestrator::new(
        registry.clone(),
        tokens,
        config.timeouts,
    ));
    let connections = Arc::new(ConnectionService::new(
        credentials,
        registry,
        OAuthStateSigner::new(&config.oauth_state_secret)?,
    ));
    let payments = Arc::new(ReconciliationService::new(payment_store.clone()));

    let scheduler = JobScheduler::with_config(
        payment_store,
        JobSchedulerConfig {
            pending_payment_ttl: config.pending_payment_ttl,
            ..JobSchedulerConfig::default()
        },
    )
    .start();

    let app = api::build_router(AppState::new(orchestrator, connections, payments));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    scheduler.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
