//! Sentrion governance server
//!
//! Thin Axum wiring around the evaluation pipeline, verification engine,
//! fee ledger, escalation engine, event bus, and trace linker. HTTP
//! transport concerns the core does not specify — auth, rate-limiting,
//! CORS — are intentionally absent here.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use sentrion_store::SqliteStore;
use sentrion_treasury::TreasuryConfig;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod dispatch;
mod error;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://sentrion.db".to_string());
    let store = SqliteStore::connect(&database_url)
        .await
        .expect("failed to connect to the governance store");

    let fee_gating_enabled = std::env::var("SENTRION_FEE_GATING_ENABLED")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(TreasuryConfig::default().fee_gating_enabled);
    let state = Arc::new(AppState::with_treasury_config(
        Arc::new(store),
        TreasuryConfig { fee_gating_enabled },
    ));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/actions/evaluate", post(routes::evaluate))
        .route("/actions/verify", post(routes::verify))
        .route("/policies", get(routes::list_policies).post(routes::create_policy))
        .route("/policies/:policy_id", delete(routes::archive_policy))
        .route("/stream", get(routes::stream))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{port}");

    tracing::info!(%addr, "sentrion governance server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind listener");
    axum::serve(listener, app).await.expect("server error");
}
