//! Overlay and voice test endpoints.
//!
//! Both exist so an operator can exercise the overlay without spending
//! money: `overlay_test` fires a synthetic `purchase` broadcast with
//! clamped inputs, `tts_test` synthesizes arbitrary text with an explicit
//! deadline.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::AppError;
use crate::models::purchase::{PurchaseSource, cents_to_value};
use crate::services::{pipeline, tenant, tts};
use crate::state::AppState;

const MAX_USERNAME_CHARS: usize = 40;
const MAX_TITLE_CHARS: usize = 160;
const MAX_MESSAGE_CHARS: usize = 260;

const DEFAULT_TEST_USERNAME: &str = "Teste";
const DEFAULT_TEST_VALUE: f64 = 5.0;
const DEFAULT_TEST_MESSAGE: &str = "Isso é um alerta de teste.";

const TTS_TEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TTS_TEST_TEXT: &str = "Teste de voz do overlay";

/// Overlay test request. Every field is optional and clamped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayTestRequest {
    pub username: Option<String>,
    pub total_value: Option<f64>,
    /// Overrides the rendered overlay title
    pub title: Option<String>,
    /// Spoken/buyer message shown under the title
    pub message: Option<String>,
}

/// Handle `POST /{tenant}/api/overlay-test`.
///
/// Broadcasts a synthetic purchase event. No dispatcher, no ledger, no
/// goal movement; the only side effect is the push to open overlay
/// connections.
pub async fn overlay_test(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<OverlayTestRequest>,
) -> Result<Json<Value>, AppError> {
    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    let username = clamped(request.username.as_deref(), MAX_USERNAME_CHARS)
        .unwrap_or_else(|| DEFAULT_TEST_USERNAME.to_string());

    let total_value = request
        .total_value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(DEFAULT_TEST_VALUE);
    let total_cents = (total_value * 100.0).round() as i64;

    // A provided title is still a template; placeholders render either way
    let template = clamped(request.title.as_deref(), MAX_TITLE_CHARS)
        .unwrap_or_else(|| config.overlay_template().to_string());
    let amount_text = format_brl(total_cents);
    let overlay_message = pipeline::render_template(&template, &username, &amount_text);

    let buyer_message = clamped(request.message.as_deref(), MAX_MESSAGE_CHARS)
        .unwrap_or_else(|| DEFAULT_TEST_MESSAGE.to_string());

    let event = pipeline::PurchaseEvent {
        username: username.clone(),
        total_value: cents_to_value(total_cents),
        overlay_message: overlay_message.clone(),
        buyer_message: buyer_message.clone(),
        tts_message: buyer_message,
        audio_url: None,
        sound_url: config.sound_url(),
        items: Vec::new(),
        source: PurchaseSource::OverlayTest.as_str().to_string(),
    };
    state
        .broadcaster
        .publish(&tenant, pipeline::PURCHASE_EVENT, &event);

    tracing::info!(
        tenant,
        subscribers = state.broadcaster.subscriber_count(&tenant),
        "overlay test broadcast"
    );

    Ok(Json(json!({
        "ok": true,
        "overlayMessage": overlay_message,
        "soundUrl": config.sound_url(),
    })))
}

/// Voice test request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TtsTestRequest {
    pub text: Option<String>,
    pub voice: Option<String>,
}

/// Handle `POST /{tenant}/api/tts-test`.
///
/// Synthesizes arbitrary text under an explicit deadline: a hung speech
/// service maps to 504, a synthesis that yields no audio to 500. This is
/// the one path where "no audio" is an error rather than a degraded
/// purchase.
pub async fn tts_test(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<TtsTestRequest>,
) -> Result<Json<Value>, AppError> {
    let config = tenant::read_config(&state.pool, &tenant)
        .await?
        .ok_or(AppError::TenantNotFound)?;

    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TTS_TEST_TEXT)
        .to_string();

    let requested_voice = request
        .voice
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| config.default_voice());
    let voice = tts::resolve_voice(requested_voice);

    let url = tokio::time::timeout(
        TTS_TEST_TIMEOUT,
        state.tts.synthesize(&tenant, &text, Some(voice)),
    )
    .await
    .map_err(|_| AppError::UpstreamTimeout)?
    .ok_or(AppError::SynthesisFailed)?;

    Ok(Json(json!({ "url": url, "voice": voice })))
}

/// Format cents as full BRL currency text: `R$` prefix, dot-grouped
/// thousands, always two decimals (`"R$ 1.234,50"`).
///
/// Unlike the webhook path's bare amount text, the overlay test shows the
/// full currency form.
fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("{sign}R$ {grouped},{fraction:02}")
}

/// Trim, drop when empty, and truncate on a character boundary.
fn clamped(value: Option<&str>, max_chars: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_trims_and_truncates_on_char_boundaries() {
        assert_eq!(clamped(Some("  Maria  "), 40).as_deref(), Some("Maria"));
        assert_eq!(clamped(Some("   "), 40), None);
        assert_eq!(clamped(None, 40), None);

        let long = "é".repeat(50);
        let cut = clamped(Some(&long), 40).unwrap();
        assert_eq!(cut.chars().count(), 40);
    }

    #[test]
    fn brl_text_always_carries_symbol_and_two_decimals() {
        assert_eq!(format_brl(500), "R$ 5,00");
        assert_eq!(format_brl(750), "R$ 7,50");
        assert_eq!(format_brl(0), "R$ 0,00");
        assert_eq!(format_brl(123_450), "R$ 1.234,50");
        assert_eq!(format_brl(100_000_000), "R$ 1.000.000,00");
    }

    #[test]
    fn negative_and_non_finite_values_fall_back() {
        for bad in [Some(-1.0), Some(f64::NAN), Some(f64::INFINITY), None] {
            let value = bad.filter(|v: &f64| v.is_finite() && *v >= 0.0).unwrap_or(DEFAULT_TEST_VALUE);
            assert_eq!(value, DEFAULT_TEST_VALUE);
        }
    }
}
