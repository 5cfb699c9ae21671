//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::rcon::RconError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid or missing API keys, bad webhook signatures
/// - **Resource Errors**: Tenant, product, or purchase not found
/// - **Validation Errors**: Invalid request data, rejected webhook payloads
/// - **Dispatch Errors**: Remote console failures in the interactive paths
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or does not match the tenant.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook signature does not match the tenant's shared secret.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// No configuration exists for the requested tenant.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Tenant configuration not found")]
    TenantNotFound,

    /// Requested product key is missing from the tenant's catalog.
    ///
    /// Returns HTTP 400 Bad Request (interactive test paths only; the
    /// webhook pipeline skips unknown products instead).
    #[error("Product not found")]
    ProductNotFound,

    /// Stored purchase not found for replay.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Purchase not found")]
    PurchaseNotFound,

    /// RCON connection parameters are incomplete for an operation that
    /// requires them (test-product, replay).
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("RCON configuration is incomplete")]
    MissingRconConfig,

    /// Remote console dispatch failed in an interactive path where the
    /// caller is waiting for the outcome.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] RconError),

    /// An upstream service (speech, payment provider) did not answer
    /// within the deadline.
    ///
    /// Returns HTTP 504 Gateway Timeout, distinguishable from a generic
    /// synthesis failure.
    #[error("Upstream service timed out")]
    UpstreamTimeout,

    /// Speech synthesis produced no audio in a path where the caller asked
    /// for it explicitly.
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Speech synthesis failed")]
    SynthesisFailed,

    /// Inbound webhook payload was rejected before any side effect.
    ///
    /// Returns HTTP 400 Bad Request with a `reasons` array.
    #[error("Invalid webhook payload")]
    InvalidWebhook(Vec<String>),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Webhook payload rejections use the flat shape the payment provider
/// expects instead: `{"error": ..., "reasons": [...]}`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Webhook rejections carry their individual reasons
        if let AppError::InvalidWebhook(reasons) = self {
            let body = Json(json!({
                "error": "Invalid payload",
                "reasons": reasons
            }));
            return (StatusCode::BAD_REQUEST, body).into_response();
        }

        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::TenantNotFound => {
                (StatusCode::NOT_FOUND, "tenant_not_found", self.to_string())
            }
            AppError::ProductNotFound => (
                StatusCode::BAD_REQUEST,
                "product_not_found",
                self.to_string(),
            ),
            AppError::PurchaseNotFound => (
                StatusCode::NOT_FOUND,
                "purchase_not_found",
                self.to_string(),
            ),
            AppError::MissingRconConfig => (
                StatusCode::BAD_REQUEST,
                "missing_rcon_config",
                self.to_string(),
            ),
            AppError::Dispatch(_) => {
                (StatusCode::BAD_GATEWAY, "dispatch_failed", self.to_string())
            }
            AppError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                self.to_string(),
            ),
            AppError::SynthesisFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "synthesis_failed",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidWebhook(_) => unreachable!("handled above"),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
