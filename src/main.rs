//! Stream Overlay Service - Main Application Entry Point
//!
//! Multi-tenant backend for stream purchase overlays: it ingests payment
//! webhooks, dispatches game-server commands over RCON, synthesizes
//! text-to-speech audio, accumulates a fundraising goal, and pushes
//! `purchase` events to overlay pages over SSE.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: per-tenant API key with SHA-256 hashing; optional
//!   HMAC signature on inbound webhooks
//! - **Format**: JSON requests/responses, SSE for the push channel
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build the shared state (broadcaster, speech synthesizer, HTTP client)
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::services::{broadcast::Broadcaster, tts::SpeechSynthesizer};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let settings = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&settings.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Outbound HTTP client shared by the provider call and the speech service
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let tts = SpeechSynthesizer::new(
        http.clone(),
        settings.speech_key.clone(),
        settings.speech_region.clone(),
        settings.data_dir.clone(),
    );

    let state = AppState {
        pool,
        broadcaster: Broadcaster::new(),
        tts,
        http,
        settings: Arc::new(settings),
    };

    // Tenant-key gated routes (operator tooling)
    let authenticated_routes = Router::new()
        .route(
            "/{tenant}/api/test-product",
            post(handlers::purchases::test_product),
        )
        .route(
            "/{tenant}/api/overlay-test",
            post(handlers::overlay::overlay_test),
        )
        .route("/{tenant}/api/tts-test", post(handlers::overlay::tts_test))
        .route("/{tenant}/api/purchases", get(handlers::purchases::list))
        .route("/{tenant}/api/metrics", get(handlers::purchases::metrics))
        .route("/{tenant}/api/replay", post(handlers::purchases::replay))
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Combine authenticated routes with public routes
    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/tenants", post(handlers::admin::create_tenant))
        .route("/{tenant}/api/webhook", post(handlers::webhooks::ingest))
        .route("/{tenant}/api/checkout", post(handlers::checkout::create))
        .route("/{tenant}/events", get(handlers::events::subscribe))
        // Merge authenticated routes
        .merge(authenticated_routes)
        // Everything else resolves into the per-tenant asset tree
        // (synthesized TTS clips, alert sounds, overlay pages)
        .fallback_service(ServeDir::new(&state.settings.data_dir))
        // Overlay pages may be embedded from other origins (OBS browser sources)
        .layer(CorsLayer::permissive())
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Share application state with all handlers via State extraction
        .with_state(state.clone());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", state.settings.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
