//! Inbound payment webhook payload and its normalization.
//!
//! Payment providers send loosely shaped JSON: the buyer name may arrive
//! under several keys, line items may be missing in favor of a single
//! `product` field, and quantities sometimes come as strings. All of that
//! is captured here in one explicit payload type and resolved exactly once,
//! at the top of the pipeline, into a [`ResolvedOrder`] with a documented
//! precedence for every logical field.

use serde::Deserialize;

use crate::models::checkout::PendingCheckout;
use crate::models::purchase::PurchasedItem;

/// Raw inbound webhook body.
///
/// Every field is optional; unknown fields are ignored. Field precedence is
/// applied by [`WebhookPayload::resolve`], never by consumers.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    /// Order token correlating this notification with a reservation
    pub order_nsu: Option<String>,

    // Buyer name aliases, in decreasing precedence
    pub customer_name: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,

    /// Buyer's free-text message destined for speech synthesis
    pub tts_text: Option<String>,

    // Voice aliases, in decreasing precedence
    pub tts_voice: Option<String>,
    #[serde(rename = "ttsVoice")]
    pub tts_voice_camel: Option<String>,

    /// Line items; when absent, `product` may describe a single item
    pub items: Option<Vec<RawLineItem>>,

    /// Single-product shorthand used by some provider notifications
    pub product: Option<String>,
}

/// One loosely typed line item from the provider.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RawLineItem {
    pub description: Option<String>,
    /// Number or numeric string; anything else counts as one unit
    pub quantity: Option<serde_json::Value>,
    /// Unit price in cents; `amount` is an accepted alias
    pub price: Option<serde_json::Value>,
    pub amount: Option<serde_json::Value>,
}

impl RawLineItem {
    fn quantity_or_one(&self) -> i64 {
        coerce_i64(self.quantity.as_ref()).filter(|q| *q > 0).unwrap_or(1)
    }

    fn price_cents(&self) -> i64 {
        coerce_i64(self.price.as_ref())
            .or_else(|| coerce_i64(self.amount.as_ref()))
            .unwrap_or(0)
    }
}

/// Accept JSON numbers and numeric strings; reject everything else.
fn coerce_i64(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fully resolved order: one normalized record the rest of the pipeline
/// consumes without ever looking back at the raw payload.
#[derive(Debug, Clone)]
pub struct ResolvedOrder {
    pub order_token: Option<String>,
    pub username: String,
    pub tts_text: String,
    pub tts_voice: Option<String>,
    /// Items the dispatcher translates into game commands
    pub dispatch_items: Vec<PurchasedItem>,
    /// Total purchase value in cents, from the priced item source
    pub total_cents: i64,
}

/// Fallback buyer name when neither the reservation nor the payload has one.
pub const FALLBACK_BUYER_NAME: &str = "Cliente";

impl WebhookPayload {
    /// Resolve the payload against an optional reservation.
    ///
    /// # Precedence
    ///
    /// - buyer name: reservation > `customer_name` > `username` > `name` >
    ///   the fallback literal
    /// - speech text: reservation message > `tts_text` > empty
    /// - voice: reservation > `tts_voice` > `ttsVoice` > none (tenant
    ///   default applies later)
    /// - dispatch items: payload items (with the `product` shorthand) when
    ///   non-empty, else the reservation's items
    /// - total value: reservation items when non-empty (they carry the
    ///   trusted prices), else the payload's priced items
    pub fn resolve(&self, reservation: Option<&PendingCheckout>) -> ResolvedOrder {
        let username = reservation
            .map(|r| r.buyer_name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| first_non_blank(&[&self.customer_name, &self.username, &self.name]))
            .unwrap_or_else(|| FALLBACK_BUYER_NAME.to_string());

        let tts_text = reservation
            .map(|r| r.tts_message.clone())
            .filter(|t| !t.is_empty())
            .or_else(|| self.tts_text.clone())
            .unwrap_or_default();

        let tts_voice = reservation
            .and_then(|r| r.tts_voice.clone())
            .filter(|v| !v.trim().is_empty())
            .or_else(|| first_non_blank(&[&self.tts_voice, &self.tts_voice_camel]));

        let mut dispatch_items = self.sanitized_items();
        if dispatch_items.is_empty() {
            if let Some(r) = reservation {
                dispatch_items = r
                    .items
                    .iter()
                    .filter(|it| !it.description.trim().is_empty())
                    .map(|it| PurchasedItem {
                        description: it.description.clone(),
                        quantity: it.quantity.max(1),
                    })
                    .collect();
            }
        }

        let total_cents = match reservation.filter(|r| !r.items.is_empty()) {
            Some(r) => r
                .items
                .iter()
                .map(|it| it.quantity.max(1) * it.price_cents)
                .sum(),
            None => self
                .items
                .iter()
                .flatten()
                .map(|it| it.quantity_or_one() * it.price_cents())
                .sum(),
        };

        ResolvedOrder {
            order_token: self
                .order_nsu
                .clone()
                .filter(|t| !t.trim().is_empty()),
            username,
            tts_text,
            tts_voice,
            dispatch_items,
            total_cents,
        }
    }

    /// Payload items with blank descriptions dropped and quantities
    /// defaulted to one; falls back to the single `product` field.
    fn sanitized_items(&self) -> Vec<PurchasedItem> {
        let from_items: Vec<PurchasedItem> = self
            .items
            .iter()
            .flatten()
            .filter_map(|it| {
                let description = it.description.as_deref()?.trim();
                if description.is_empty() {
                    return None;
                }
                Some(PurchasedItem {
                    description: description.to_string(),
                    quantity: it.quantity_or_one(),
                })
            })
            .collect();

        if !from_items.is_empty() {
            return from_items;
        }

        self.product
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                vec![PurchasedItem {
                    description: p.to_string(),
                    quantity: 1,
                }]
            })
            .unwrap_or_default()
    }
}

fn first_non_blank(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::CheckoutItem;
    use chrono::{Duration, Utc};
    use sqlx::types::Json;

    fn reservation() -> PendingCheckout {
        let now = Utc::now();
        PendingCheckout {
            order_token: "ABC123".to_string(),
            buyer_name: "Maria".to_string(),
            tts_message: "oi!".to_string(),
            tts_voice: None,
            items: Json(vec![CheckoutItem {
                description: "P1".to_string(),
                quantity: 2,
                price_cents: 500,
            }]),
            created_at: now,
            expires_at: now + Duration::minutes(30),
        }
    }

    fn parse(body: &str) -> WebhookPayload {
        serde_json::from_str(body).expect("payload parses")
    }

    #[test]
    fn reservation_fields_take_precedence_over_payload_fields() {
        let payload = parse(r#"{"order_nsu":"ABC123","customer_name":"Someone","tts_text":"hi"}"#);
        let r = reservation();
        let resolved = payload.resolve(Some(&r));

        assert_eq!(resolved.username, "Maria");
        assert_eq!(resolved.tts_text, "oi!");
        assert_eq!(resolved.order_token.as_deref(), Some("ABC123"));
        // No payload items: dispatch falls back to the reservation's
        assert_eq!(
            resolved.dispatch_items,
            vec![PurchasedItem { description: "P1".to_string(), quantity: 2 }]
        );
        // 2 x 500 cents
        assert_eq!(resolved.total_cents, 1000);
    }

    #[test]
    fn buyer_name_aliases_resolve_in_order() {
        let resolved = parse(r#"{"username":"second","name":"third"}"#).resolve(None);
        assert_eq!(resolved.username, "second");

        let resolved = parse(r#"{"name":"third"}"#).resolve(None);
        assert_eq!(resolved.username, "third");

        let resolved = parse(r#"{}"#).resolve(None);
        assert_eq!(resolved.username, FALLBACK_BUYER_NAME);
    }

    #[test]
    fn voice_aliases_resolve_in_order() {
        let resolved = parse(r#"{"tts_voice":"snake","ttsVoice":"camel"}"#).resolve(None);
        assert_eq!(resolved.tts_voice.as_deref(), Some("snake"));

        let resolved = parse(r#"{"ttsVoice":"camel"}"#).resolve(None);
        assert_eq!(resolved.tts_voice.as_deref(), Some("camel"));
    }

    #[test]
    fn payload_items_tolerate_string_quantities_and_amount_alias() {
        let payload = parse(
            r#"{"items":[{"description":"P1","quantity":"2","amount":300},
                         {"description":"  ","quantity":1},
                         {"quantity":5}]}"#,
        );
        let resolved = payload.resolve(None);

        // Blank and description-less items are dropped, not errors
        assert_eq!(
            resolved.dispatch_items,
            vec![PurchasedItem { description: "P1".to_string(), quantity: 2 }]
        );
        assert_eq!(resolved.total_cents, 600);
    }

    #[test]
    fn single_product_field_stands_in_for_items() {
        let resolved = parse(r#"{"product":"P1"}"#).resolve(None);
        assert_eq!(
            resolved.dispatch_items,
            vec![PurchasedItem { description: "P1".to_string(), quantity: 1 }]
        );
        // Shorthand carries no price
        assert_eq!(resolved.total_cents, 0);
    }

    #[test]
    fn empty_payload_without_reservation_has_no_items() {
        let resolved = parse(r#"{"order_nsu":"UNKNOWN1"}"#).resolve(None);
        assert!(resolved.dispatch_items.is_empty());
        assert_eq!(resolved.total_cents, 0);
    }

    #[test]
    fn reservation_prices_win_over_payload_prices() {
        let payload = parse(r#"{"items":[{"description":"P1","quantity":1,"price":9999}]}"#);
        let r = reservation();
        let resolved = payload.resolve(Some(&r));
        // Value comes from the reserved items; dispatch keeps the payload's
        assert_eq!(resolved.total_cents, 1000);
        assert_eq!(resolved.dispatch_items[0].quantity, 1);
    }

    #[test]
    fn blank_order_token_is_treated_as_absent() {
        let resolved = parse(r#"{"order_nsu":"  "}"#).resolve(None);
        assert!(resolved.order_token.is_none());
    }
}
