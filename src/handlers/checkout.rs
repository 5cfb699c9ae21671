//! Checkout link creation.
//!
//! Creates a payment-provider checkout link and reserves the buyer's
//! identity under a fresh order token, so the later webhook can attribute
//! the purchase even though the provider notification carries no buyer
//! details. When no provider URL is configured, the endpoint degrades to a
//! local reservation only.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::checkout::{CheckoutItem, NewReservation};
use crate::models::webhook::FALLBACK_BUYER_NAME;
use crate::services::{checkout, tenant};
use crate::state::AppState;

/// Checkout creation request.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub tts_text: Option<String>,
    #[serde(default)]
    pub tts_voice: Option<String>,
    #[serde(default)]
    pub items: Vec<CheckoutItemRequest>,
}

/// One requested line item; `price_cents` accepts `amount` as an alias.
#[derive(Debug, Deserialize)]
pub struct CheckoutItemRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, alias = "amount")]
    pub price_cents: Option<i64>,
}

/// Handle `POST /{tenant}/api/checkout`.
///
/// # Process
///
/// 1. Normalize items, dropping entries without a positive price and
///    quantity; an empty result is a 400
/// 2. Generate an order token and reserve the buyer under it
/// 3. When a provider URL is configured, create the checkout link and pass
///    the provider response through with the token injected
pub async fn create(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    let items: Vec<CheckoutItem> = request
        .items
        .iter()
        .filter_map(normalize_item)
        .collect();

    if items.is_empty() {
        return Err(AppError::InvalidRequest(
            "no valid items for checkout".to_string(),
        ));
    }

    let order_token = checkout::generate_order_token();

    let buyer_name = request
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_BUYER_NAME)
        .to_string();

    let reservation = NewReservation {
        order_token: order_token.clone(),
        buyer_name,
        tts_message: request.tts_text.unwrap_or_default(),
        tts_voice: request
            .tts_voice
            .filter(|v| !v.trim().is_empty()),
        items: items.clone(),
    };
    checkout::reserve(&state.pool, &tenant, &reservation).await?;

    tracing::info!(tenant, order_token, items = items.len(), "checkout reserved");

    // Without a provider endpoint the reservation alone is the product;
    // the caller gets the token to embed in its own payment flow
    if state.settings.checkout_api_url.is_empty() {
        return Ok(Json(json!({ "ok": true, "orderNsu": order_token })));
    }

    if config.provider_handle.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "payment provider handle not configured".to_string(),
        ));
    }

    let base_url = public_base_url(&state);
    let provider_payload = json!({
        "handle": config.provider_handle,
        "order_nsu": order_token,
        "webhook_url": format!("{base_url}/{tenant}/api/webhook"),
        "redirect_url": format!("{base_url}/{tenant}/thanks"),
        "items": items.iter().map(|it| json!({
            "description": it.description,
            "quantity": it.quantity,
            "price": it.price_cents,
        })).collect::<Vec<_>>(),
    });

    let response = state
        .http
        .post(&state.settings.checkout_api_url)
        .json(&provider_payload)
        .send()
        .await
        .map_err(|err| {
            tracing::error!(tenant, "provider checkout call failed: {err}");
            AppError::UpstreamTimeout
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        tracing::error!(tenant, %status, detail, "provider rejected checkout");
        return Err(AppError::InvalidRequest(format!(
            "provider rejected checkout ({status})"
        )));
    }

    let mut body: Value = response.json().await.unwrap_or_else(|_| json!({ "ok": true }));
    if let Value::Object(map) = &mut body {
        map.insert("orderNsu".to_string(), json!(order_token));
    }

    Ok(Json(body))
}

/// Externally reachable base URL for provider callbacks.
fn public_base_url(state: &AppState) -> String {
    state
        .settings
        .public_base_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://localhost:{}", state.settings.server_port))
}

/// Keep only items with a positive price and quantity.
fn normalize_item(item: &CheckoutItemRequest) -> Option<CheckoutItem> {
    let description = item.description.as_deref()?.trim();
    if description.is_empty() {
        return None;
    }

    let quantity = item.quantity.unwrap_or(1);
    let price_cents = item.price_cents.unwrap_or(0);
    if quantity <= 0 || price_cents <= 0 {
        return None;
    }

    Some(CheckoutItem {
        description: description.to_string(),
        quantity,
        price_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: Option<&str>, quantity: Option<i64>, price: Option<i64>) -> CheckoutItemRequest {
        CheckoutItemRequest {
            description: description.map(str::to_string),
            quantity,
            price_cents: price,
        }
    }

    #[test]
    fn items_without_positive_price_and_quantity_are_dropped() {
        assert!(normalize_item(&item(Some("P1"), Some(0), Some(500))).is_none());
        assert!(normalize_item(&item(Some("P1"), Some(1), Some(0))).is_none());
        assert!(normalize_item(&item(Some("P1"), Some(-1), Some(500))).is_none());
        assert!(normalize_item(&item(None, Some(1), Some(500))).is_none());
        assert!(normalize_item(&item(Some("  "), Some(1), Some(500))).is_none());
    }

    #[test]
    fn quantity_defaults_to_one() {
        let normalized = normalize_item(&item(Some("P1"), None, Some(500))).unwrap();
        assert_eq!(normalized.quantity, 1);
        assert_eq!(normalized.price_cents, 500);
    }

    #[test]
    fn amount_alias_deserializes_into_price() {
        let parsed: CheckoutItemRequest =
            serde_json::from_str(r#"{"description":"P1","quantity":2,"amount":750}"#).unwrap();
        assert_eq!(parsed.price_cents, Some(750));
    }
}
