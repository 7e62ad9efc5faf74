//! Server-side code for the Bloc lead assignment CRM
//!
//! This module contains all backend functionality:
//! - Database access (PostgreSQL via sqlx)
//! - The assignment engine (state round robin with daily caps)
//! - Webhook ingest and CRUD/query API routes
//! - Realtime assignment feed over WebSocket

pub mod assignment;
pub mod callers_api;
pub mod config;
pub mod db;
pub mod error;
pub mod leads_api;
pub mod realtime;
pub mod webhook;

#[cfg(test)]
mod engine_tests;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Json, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use realtime::Broadcaster;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub broadcaster: Broadcaster,
    pub webhook_secret: Option<String>,
}

/// Create the Axum router with all API routes
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Webhook ingest
        .route("/api/leads/webhook", post(webhook::lead_webhook))

        // Lead routes
        .route("/api/leads", get(leads_api::list_leads))
        .route("/api/leads/{id}", get(leads_api::get_lead))
        .route("/api/leads/{id}/reassign", patch(leads_api::reassign_lead))

        // Caller routes
        .route("/api/callers", get(callers_api::list_callers).post(callers_api::create_caller))
        .route(
            "/api/callers/{id}",
            get(callers_api::get_caller)
                .put(callers_api::update_caller)
                .delete(callers_api::delete_caller),
        )
        .route("/api/callers/{id}/status", patch(callers_api::update_caller_status))

        // Realtime dashboard feed
        .route("/ws/dashboard", get(realtime::dashboard_ws))

        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(AllowOrigin::list(parsed))
    }
}

// Health check
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

/// Initialize and start the server
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = db::init_pool(&config.database_url).await?;

    // Run migrations (non-fatal if already applied)
    if let Err(e) = db::run_migrations(&pool).await {
        tracing::warn!("migration warning (may be already applied): {e}");
    }

    let state = AppState {
        db: pool,
        broadcaster: Broadcaster::new(256),
        webhook_secret: config.webhook_secret.clone(),
    };

    let app = create_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("server running on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
