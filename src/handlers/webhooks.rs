//! Payment webhook ingestion.
//!
//! The handler does only the fast part inline: load config, verify the
//! signature, parse and normalize the payload, validate. Everything slow
//! (RCON, speech synthesis, broadcast, ledger) is detached to the
//! background pipeline so the provider gets its acknowledgment within its
//! delivery timeout.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use crate::error::AppError;
use crate::models::webhook::WebhookPayload;
use crate::services::{checkout, pipeline, tenant};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Handle `POST /{tenant}/api/webhook`.
///
/// # Process
///
/// 1. Load the tenant configuration (404 when the tenant is unknown)
/// 2. Verify the HMAC signature over the raw body, when the tenant has a
///    webhook secret configured
/// 3. Parse the body leniently and resolve it against a matching checkout
///    reservation, if one is still live
/// 4. Reject with 400 and a `reasons` list when no dispatchable item
///    survives normalization
/// 5. Detach the processing pipeline and acknowledge immediately
pub async fn ingest(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    if !config.webhook_secret.is_empty() {
        verify_signature(&config.webhook_secret, &headers, &body)?;
    }

    // Providers occasionally send malformed bodies; parse failures are a
    // validation outcome, not a transport error
    let payload: Option<WebhookPayload> = serde_json::from_slice(&body).ok();

    let Some(payload) = payload else {
        return Err(AppError::InvalidWebhook(vec![
            "missing payload".to_string(),
            "no valid items in payload".to_string(),
        ]));
    };

    let reservation = match payload.order_nsu.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => checkout::resolve(&state.pool, &tenant, token).await?,
        _ => None,
    };

    let order = payload.resolve(reservation.as_ref());

    if order.dispatch_items.is_empty() {
        return Err(AppError::InvalidWebhook(vec![
            "no valid items in payload".to_string(),
        ]));
    }

    tracing::info!(
        tenant,
        order_token = ?order.order_token,
        username = %order.username,
        items = order.dispatch_items.len(),
        "webhook accepted"
    );

    pipeline::spawn_background(state, config, order);

    Ok(Json(json!({ "status": "OK", "dispatchedAsync": true })))
}

/// Check `X-Webhook-Signature: sha256=<hex>` against the raw body.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("sha256="))
        .ok_or(AppError::InvalidSignature)?;

    let digest = hex::decode(provided.trim()).map_err(|_| AppError::InvalidSignature)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&digest).map_err(|_| AppError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"order_nsu":"ABC"}"#;
        let headers = headers_with(&sign("s3cret", body));
        assert!(verify_signature("s3cret", &headers, body).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let headers = headers_with(&sign("s3cret", b"original"));
        assert!(matches!(
            verify_signature("s3cret", &headers, b"tampered"),
            Err(AppError::InvalidSignature)
        ));
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        assert!(matches!(
            verify_signature("s3cret", &HeaderMap::new(), b"body"),
            Err(AppError::InvalidSignature)
        ));

        let headers = headers_with("md5=abcd");
        assert!(matches!(
            verify_signature("s3cret", &headers, b"body"),
            Err(AppError::InvalidSignature)
        ));

        let headers = headers_with("sha256=nothex");
        assert!(matches!(
            verify_signature("s3cret", &headers, b"body"),
            Err(AppError::InvalidSignature)
        ));
    }
}
