//! Health check endpoint.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Liveness plus a database round-trip.
///
/// Returns 200 with `{"status": "ok", "database": "connected"}` when the
/// pool can execute a trivial query; a failed query surfaces as 500.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: "connected".to_string(),
    }))
}
