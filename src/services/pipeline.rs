//! Webhook pipeline - the purchase-processing state machine.
//!
//! The HTTP handler runs only the fast, synchronous part (parse, resolve
//! the reservation, validate) and responds immediately; everything with
//! network latency runs here as a detached background task:
//!
//! ```text
//! dispatch_rcon -> synthesize_tts -> goal_update -> broadcast
//!   -> ledger_write -> registry_release
//! ```
//!
//! Dispatch and synthesis are best-effort sub-steps: their failures are
//! logged and must never prevent accounting or broadcast. The steps run
//! strictly in order within one invocation; concurrent invocations for
//! different order tokens may interleave freely.

use serde::Serialize;

use crate::error::AppError;
use crate::models::purchase::{NewPurchase, PurchaseSource, PurchasedItem, cents_to_value};
use crate::models::tenant::TenantConfig;
use crate::models::webhook::ResolvedOrder;
use crate::services::{checkout, dispatcher, ledger, tenant};
use crate::state::AppState;

/// SSE event name for purchase announcements.
pub const PURCHASE_EVENT: &str = "purchase";

/// Payload of a `purchase` event as delivered to overlay subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    pub username: String,
    pub total_value: f64,
    pub overlay_message: String,
    /// The buyer's free-text message, verbatim
    pub buyer_message: String,
    /// Same text, under the name the overlay script reads for speech
    pub tts_message: String,
    pub audio_url: Option<String>,
    pub sound_url: Option<String>,
    pub items: Vec<PurchasedItem>,
    pub source: String,
}

/// Detach the asynchronous tail of webhook processing.
///
/// The task owns its data and runs to completion; any error that escapes
/// the step-level handling is caught here and logged with context, never
/// silently dropped and never able to crash the process.
pub fn spawn_background(state: AppState, config: TenantConfig, order: ResolvedOrder) {
    let tenant_id = config.id.clone();
    let order_token = order.order_token.clone();
    let rcon_host = config.rcon.host.clone();
    let item_summary: Vec<String> = order
        .dispatch_items
        .iter()
        .take(5)
        .map(|it| format!("{}x{}", it.description, it.quantity))
        .collect();

    tokio::spawn(async move {
        if let Err(err) = run(&state, &config, &order).await {
            tracing::error!(
                tenant = %tenant_id,
                order_token = ?order_token,
                rcon_host = %rcon_host,
                items = ?item_summary,
                "webhook background task failed: {err}"
            );
        }
    });
}

/// Execute the ordered pipeline steps for one validated webhook.
async fn run(state: &AppState, config: &TenantConfig, order: &ResolvedOrder) -> Result<(), AppError> {
    let tenant = config.id.as_str();

    // Dispatch is skipped, not failed, when it cannot or must not run:
    // incomplete RCON settings, or a token the ledger has already seen
    // (a provider retry after the reservation was released).
    let already_recorded = match &order.order_token {
        Some(token) => ledger::exists(&state.pool, tenant, token)
            .await
            .unwrap_or_else(|err| {
                tracing::error!(tenant, "ledger probe failed, assuming unrecorded: {err}");
                false
            }),
        None => false,
    };

    if already_recorded {
        tracing::info!(
            tenant,
            order_token = ?order.order_token,
            "order token already in ledger, not re-dispatching"
        );
    } else if !config.rcon.is_complete() {
        tracing::info!(tenant, "incomplete RCON settings, skipping dispatch");
    } else {
        tracing::info!(tenant, items = order.dispatch_items.len(), "dispatching game commands");
        match dispatcher::dispatch(&config.rcon, &config.products, &order.dispatch_items, &order.username).await {
            Ok(()) => tracing::info!(tenant, "dispatch finished"),
            // Best effort: accounting and broadcast still happen below
            Err(err) => tracing::error!(tenant, "dispatch failed: {err}"),
        }
    }

    // Message composition: the rendered text is reused unchanged across
    // TTS input, broadcast payload, and ledger record.
    let amount_text = format_currency(order.total_cents);
    let overlay_message = render_template(config.overlay_template(), &order.username, &amount_text);
    let speech_input = combine_speech(&overlay_message, &order.tts_text);

    let voice = order
        .tts_voice
        .as_deref()
        .or_else(|| config.default_voice());

    let audio_url = state.tts.synthesize(tenant, &speech_input, voice).await;

    if order.total_cents > 0 {
        if let Err(err) = tenant::add_to_goal(&state.pool, tenant, order.total_cents).await {
            tracing::error!(tenant, "goal update failed: {err}");
        }
    } else {
        tracing::warn!(
            tenant,
            order_token = ?order.order_token,
            total_cents = order.total_cents,
            "skipping goal update for non-positive purchase value"
        );
    }

    let event = PurchaseEvent {
        username: order.username.clone(),
        total_value: cents_to_value(order.total_cents),
        overlay_message: overlay_message.clone(),
        buyer_message: order.tts_text.clone(),
        tts_message: order.tts_text.clone(),
        audio_url,
        sound_url: config.sound_url(),
        items: order.dispatch_items.clone(),
        source: PurchaseSource::Webhook.as_str().to_string(),
    };
    state.broadcaster.publish(tenant, PURCHASE_EVENT, &event);
    tracing::info!(
        tenant,
        subscribers = state.broadcaster.subscriber_count(tenant),
        "purchase event broadcast"
    );

    let record = NewPurchase {
        order_token: order.order_token.clone(),
        username: order.username.clone(),
        overlay_message,
        tts_message: order.tts_text.clone(),
        tts_voice: voice.map(str::to_string),
        total_cents: order.total_cents,
        items: order.dispatch_items.clone(),
        source: PurchaseSource::Webhook,
    };
    // A failed ledger write is logged but cannot be surfaced: the provider
    // already got its acknowledgment
    if let Err(err) = ledger::record(&state.pool, tenant, &record).await {
        tracing::error!(tenant, order_token = ?order.order_token, "ledger write failed: {err}");
    }

    if let Some(token) = &order.order_token {
        checkout::release(&state.pool, tenant, token).await?;
        tracing::info!(tenant, order_token = %token, "checkout reservation released");
    }

    Ok(())
}

/// Format cents as spoken/overlay currency text.
///
/// Integer amounts render bare; fractional amounts render with exactly two
/// comma-separated decimals. The exact shape is load-bearing: it is
/// substituted directly into spoken and displayed text.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = cents / 100;
    let fraction = cents % 100;

    if fraction == 0 {
        format!("{sign}{whole}")
    } else {
        format!("{sign}{whole},{fraction:02}")
    }
}

/// Substitute `{username}` and `{valor}` into a message template.
///
/// Placeholder names match case-insensitively; unknown placeholders are
/// left untouched.
pub fn render_template(template: &str, username: &str, amount: &str) -> String {
    let mut out = String::with_capacity(template.len() + username.len() + amount.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];

        match after.find('}') {
            Some(end) => {
                let placeholder = &after[1..end];
                match placeholder.to_ascii_lowercase().as_str() {
                    "username" => out.push_str(username),
                    "valor" => out.push_str(amount),
                    _ => out.push_str(&after[..=end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(after);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Concatenate the rendered overlay message with the buyer's free text for
/// the TTS input, skipping empty parts.
pub fn combine_speech(overlay_message: &str, buyer_message: &str) -> String {
    [overlay_message, buyer_message]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_amounts_render_without_decimals() {
        assert_eq!(format_currency(700), "7");
        assert_eq!(format_currency(0), "0");
        assert_eq!(format_currency(100_000), "1000");
    }

    #[test]
    fn fractional_amounts_render_with_two_comma_separated_decimals() {
        assert_eq!(format_currency(750), "7,50");
        assert_eq!(format_currency(1250), "12,50");
        assert_eq!(format_currency(705), "7,05");
        assert_eq!(format_currency(1), "0,01");
    }

    #[test]
    fn negative_amounts_keep_their_sign() {
        assert_eq!(format_currency(-50), "-0,50");
        assert_eq!(format_currency(-700), "-7");
        assert_eq!(format_currency(-1250), "-12,50");
    }

    #[test]
    fn template_placeholders_match_case_insensitively() {
        assert_eq!(
            render_template("{Username} doou R$ {VALOR}!", "Maria", "12,50"),
            "Maria doou R$ 12,50!"
        );
    }

    #[test]
    fn repeated_and_unknown_placeholders() {
        assert_eq!(
            render_template("{username} e {username}", "Maria", "0"),
            "Maria e Maria"
        );
        assert_eq!(
            render_template("fixo {other} {valor}", "x", "7"),
            "fixo {other} 7"
        );
    }

    #[test]
    fn unterminated_placeholder_passes_through() {
        assert_eq!(render_template("oi {username", "Maria", "0"), "oi {username");
    }

    #[test]
    fn speech_input_skips_empty_parts() {
        assert_eq!(combine_speech("Nova compra", "oi!"), "Nova compra; oi!");
        assert_eq!(combine_speech("Nova compra", ""), "Nova compra");
        assert_eq!(combine_speech("", "oi!"), "oi!");
        assert_eq!(combine_speech("", "  "), "");
    }
}
