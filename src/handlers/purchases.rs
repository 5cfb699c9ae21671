//! Gated purchase endpoints: synchronous product test, history, metrics,
//! and replay of a stored purchase.
//!
//! Unlike the webhook path, these run their side effects inline and report
//! failures to the caller; the operator invoking them is waiting for the
//! outcome.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::purchase::{
    NewPurchase, PurchaseResponse, PurchaseSource, PurchasedItem, cents_to_value,
};
use crate::models::tenant::TenantConfig;
use crate::services::{dispatcher, ledger, pipeline, tenant};
use crate::state::AppState;

const RECENT_LIMIT: i64 = 50;

const METRICS_DEFAULT_LIMIT: i64 = 5_000;
const METRICS_MAX_LIMIT: i64 = 10_000;

/// Test-product request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProductRequest {
    pub product_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    /// Spoken message appended to the rendered overlay text
    #[serde(default)]
    pub tts_text: Option<String>,
    /// Voice override; falls back to the tenant default
    #[serde(default)]
    pub tts_voice: Option<String>,
    /// Also run the overlay side effects (TTS, broadcast, ledger record)
    #[serde(default = "default_simulate_overlay")]
    pub simulate_overlay: bool,
}

fn default_simulate_overlay() -> bool {
    true
}

/// Handle `POST /{tenant}/api/test-product`.
///
/// Dispatches one catalog product synchronously. Requires complete RCON
/// settings and a known product; dispatch failures surface as 502 instead
/// of being swallowed.
pub async fn test_product(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<TestProductRequest>,
) -> Result<Json<Value>, AppError> {
    let product_id = request
        .product_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("productId is required".to_string()))?;

    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    let product = config
        .products
        .get(product_id)
        .ok_or(AppError::ProductNotFound)?;

    if !config.rcon.is_complete() {
        return Err(AppError::MissingRconConfig);
    }

    let quantity = request.quantity.unwrap_or(1).max(1);
    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("Teste")
        .to_string();

    let items = vec![PurchasedItem {
        description: product.key.clone(),
        quantity,
    }];

    dispatcher::dispatch(&config.rcon, &config.products, &items, &username).await?;

    let total_cents = product.value_cents(quantity);
    tracing::info!(tenant, product = product_id, quantity, "test product dispatched");

    let mut overlay_message = None;
    let mut audio_url = None;
    if request.simulate_overlay {
        let buyer_message = request.tts_text.as_deref().unwrap_or_default();
        let requested_voice = request
            .tts_voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let (message, audio) = simulate_overlay(
            &state,
            &config,
            &username,
            buyer_message,
            requested_voice,
            total_cents,
            items.clone(),
            PurchaseSource::TestProduct,
        )
        .await;
        overlay_message = Some(message);
        audio_url = audio;
    }

    Ok(Json(json!({
        "ok": true,
        "purchaseValue": cents_to_value(total_cents),
        "overlayMessage": overlay_message,
        "audioUrl": audio_url,
        "soundUrl": config.sound_url(),
    })))
}

/// Run the overlay side of a synthetic purchase: render, synthesize,
/// broadcast, and record a token-less ledger entry. Failures inside are
/// logged, not surfaced; the dispatch already succeeded.
///
/// The spoken message and voice follow the webhook path's composition:
/// the rendered overlay text and the buyer message are combined for TTS,
/// and the requested voice wins over the tenant default.
#[allow(clippy::too_many_arguments)]
async fn simulate_overlay(
    state: &AppState,
    config: &TenantConfig,
    username: &str,
    buyer_message: &str,
    requested_voice: Option<&str>,
    total_cents: i64,
    items: Vec<PurchasedItem>,
    source: PurchaseSource,
) -> (String, Option<String>) {
    let amount_text = pipeline::format_currency(total_cents);
    let overlay_message = pipeline::render_template(config.overlay_template(), username, &amount_text);
    let speech_input = pipeline::combine_speech(&overlay_message, buyer_message);

    let voice = requested_voice.or_else(|| config.default_voice());
    let audio_url = state
        .tts
        .synthesize(&config.id, &speech_input, voice)
        .await;

    let event = pipeline::PurchaseEvent {
        username: username.to_string(),
        total_value: cents_to_value(total_cents),
        overlay_message: overlay_message.clone(),
        buyer_message: buyer_message.to_string(),
        tts_message: buyer_message.to_string(),
        audio_url: audio_url.clone(),
        sound_url: config.sound_url(),
        items: items.clone(),
        source: source.as_str().to_string(),
    };
    state
        .broadcaster
        .publish(&config.id, pipeline::PURCHASE_EVENT, &event);

    let record = NewPurchase {
        order_token: None,
        username: username.to_string(),
        overlay_message: overlay_message.clone(),
        tts_message: buyer_message.to_string(),
        tts_voice: voice.map(str::to_string),
        total_cents,
        items,
        source,
    };
    if let Err(err) = ledger::record(&state.pool, &config.id, &record).await {
        tracing::error!(tenant = %config.id, "synthetic purchase record failed: {err}");
    }

    (overlay_message, audio_url)
}

/// Handle `GET /{tenant}/api/purchases` - the most recent purchases.
pub async fn list(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Value>, AppError> {
    let purchases = ledger::list_recent(&state.pool, &tenant, RECENT_LIMIT).await?;

    let purchases: Vec<PurchaseResponse> =
        purchases.into_iter().map(PurchaseResponse::from).collect();

    Ok(Json(json!({ "purchases": purchases })))
}

/// Metrics query parameters.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

/// Handle `GET /{tenant}/api/metrics` - time-ranged purchase aggregate.
///
/// Requires RFC 3339 `from`/`to` bounds; `limit` is clamped. The response
/// carries the matching purchases plus count/sum and a `truncated` flag
/// when the limit may have cut the range short.
pub async fn metrics(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>, AppError> {
    let (from, to) = match (parse_instant(&query.from), parse_instant(&query.to)) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            return Err(AppError::InvalidRequest(
                "provide valid from/to (ISO)".to_string(),
            ));
        }
    };

    let limit = query
        .limit
        .unwrap_or(METRICS_DEFAULT_LIMIT)
        .clamp(1, METRICS_MAX_LIMIT);

    let purchases = ledger::in_range(&state.pool, &tenant, from, to, limit).await?;

    let count = purchases.len();
    let total_cents: i64 = purchases.iter().map(|p| p.total_cents).sum();
    let truncated = count as i64 >= limit;

    let purchases: Vec<PurchaseResponse> =
        purchases.into_iter().map(PurchaseResponse::from).collect();

    Ok(Json(json!({
        "ok": true,
        "tenant": tenant,
        "from": from,
        "to": to,
        "count": count,
        "totalValue": cents_to_value(total_cents),
        "purchases": purchases,
        "truncated": truncated,
    })))
}

fn parse_instant(value: &Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Replay request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    pub purchase_id: Option<String>,
}

/// Handle `POST /{tenant}/api/replay`.
///
/// Re-runs the dispatch, synthesis, and broadcast of a stored purchase.
/// Never writes the ledger: a replay is not a new purchase and must not
/// move the goal or the history.
pub async fn replay(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<Value>, AppError> {
    let id = request
        .purchase_id
        .as_deref()
        .map(str::trim)
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| AppError::InvalidRequest("purchaseId must be a valid id".to_string()))?;

    let purchase = ledger::find(&state.pool, &tenant, id)
        .await?
        .ok_or(AppError::PurchaseNotFound)?;

    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    if !config.rcon.is_complete() {
        return Err(AppError::MissingRconConfig);
    }

    let items = purchase.items.0.clone();
    if items.is_empty() {
        return Err(AppError::InvalidRequest(
            "stored purchase has no items to replay".to_string(),
        ));
    }

    dispatcher::dispatch(&config.rcon, &config.products, &items, &purchase.username).await?;

    let overlay_message = if purchase.overlay_message.trim().is_empty() {
        let amount_text = pipeline::format_currency(purchase.total_cents);
        pipeline::render_template(config.overlay_template(), &purchase.username, &amount_text)
    } else {
        purchase.overlay_message.clone()
    };

    let voice = purchase
        .tts_voice
        .as_deref()
        .or_else(|| config.default_voice());
    let speech_input = pipeline::combine_speech(&overlay_message, &purchase.tts_message);
    let audio_url = state.tts.synthesize(&tenant, &speech_input, voice).await;

    let event = pipeline::PurchaseEvent {
        username: purchase.username.clone(),
        total_value: cents_to_value(purchase.total_cents),
        overlay_message: overlay_message.clone(),
        buyer_message: purchase.tts_message.clone(),
        tts_message: purchase.tts_message.clone(),
        audio_url: audio_url.clone(),
        sound_url: config.sound_url(),
        items,
        source: PurchaseSource::Replay.as_str().to_string(),
    };
    state
        .broadcaster
        .publish(&tenant, pipeline::PURCHASE_EVENT, &event);

    tracing::info!(tenant, purchase_id = %id, "purchase replayed");

    Ok(Json(json!({
        "ok": true,
        "overlayMessage": overlay_message,
        "audioUrl": audio_url,
        "soundUrl": config.sound_url(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_request_carries_speech_fields() {
        let parsed: TestProductRequest = serde_json::from_str(
            r#"{"productId":"P1","ttsText":"valeu!","ttsVoice":"pt-BR-FranciscaNeural","simulateOverlay":false}"#,
        )
        .unwrap();

        assert_eq!(parsed.tts_text.as_deref(), Some("valeu!"));
        assert_eq!(parsed.tts_voice.as_deref(), Some("pt-BR-FranciscaNeural"));
        assert!(!parsed.simulate_overlay);
    }

    #[test]
    fn test_product_overlay_simulation_defaults_on() {
        let parsed: TestProductRequest =
            serde_json::from_str(r#"{"productId":"P1"}"#).unwrap();

        assert!(parsed.simulate_overlay);
        assert_eq!(parsed.tts_text, None);
        assert_eq!(parsed.tts_voice, None);
    }

    #[test]
    fn instants_parse_rfc3339_only() {
        let some = Some("2026-08-01T00:00:00Z".to_string());
        assert!(parse_instant(&some).is_some());

        assert!(parse_instant(&Some("yesterday".to_string())).is_none());
        assert!(parse_instant(&None).is_none());
    }

    #[test]
    fn metrics_limit_is_clamped() {
        for (requested, expected) in [(None, 5_000), (Some(0), 1), (Some(99_999), 10_000)] {
            let limit = requested
                .unwrap_or(METRICS_DEFAULT_LIMIT)
                .clamp(1, METRICS_MAX_LIMIT);
            assert_eq!(limit, expected);
        }
    }
}
