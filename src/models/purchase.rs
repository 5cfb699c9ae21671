//! Purchase ledger models and API response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// One purchased line item as recorded in the ledger and broadcast to the
/// overlay. Prices are not repeated here; the total lives on the purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedItem {
    pub description: String,
    pub quantity: i64,
}

/// Where a purchase record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseSource {
    Webhook,
    TestProduct,
    OverlayTest,
    Replay,
}

impl PurchaseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseSource::Webhook => "webhook",
            PurchaseSource::TestProduct => "test-product",
            PurchaseSource::OverlayTest => "overlay-test",
            PurchaseSource::Replay => "replay",
        }
    }
}

/// A completed purchase as stored in the `purchases` table.
///
/// When `order_token` is present, writes are upserted by token: a repeated
/// webhook for the same token refreshes fields and `updated_at` but never
/// creates a second row (`created_at` is set only on first insert).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub order_token: Option<String>,
    pub username: String,
    pub overlay_message: String,
    pub tts_message: String,
    pub tts_voice: Option<String>,
    pub total_cents: i64,
    pub items: Json<Vec<PurchasedItem>>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for a new (or refreshed) ledger entry.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub order_token: Option<String>,
    pub username: String,
    pub overlay_message: String,
    pub tts_message: String,
    pub tts_voice: Option<String>,
    pub total_cents: i64,
    pub items: Vec<PurchasedItem>,
    pub source: PurchaseSource,
}

/// Purchase as exposed over the HTTP API.
///
/// Monetary amounts are converted from stored cents to decimal currency
/// units for clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub id: Uuid,
    pub order_nsu: Option<String>,
    pub username: String,
    pub overlay_message: String,
    pub tts_message: String,
    pub tts_voice: Option<String>,
    pub total_value: f64,
    pub items: Vec<PurchasedItem>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Purchase> for PurchaseResponse {
    fn from(p: Purchase) -> Self {
        Self {
            id: p.id,
            order_nsu: p.order_token,
            username: p.username,
            overlay_message: p.overlay_message,
            tts_message: p.tts_message,
            tts_voice: p.tts_voice,
            total_value: cents_to_value(p.total_cents),
            items: p.items.0,
            source: p.source,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Convert stored cents to decimal currency units.
pub fn cents_to_value(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_convert_to_decimal_units() {
        assert_eq!(cents_to_value(1000), 10.0);
        assert_eq!(cents_to_value(750), 7.5);
        assert_eq!(cents_to_value(0), 0.0);
    }

    #[test]
    fn source_tags_match_the_wire_format() {
        assert_eq!(PurchaseSource::Webhook.as_str(), "webhook");
        assert_eq!(PurchaseSource::TestProduct.as_str(), "test-product");
        assert_eq!(PurchaseSource::OverlayTest.as_str(), "overlay-test");
        assert_eq!(PurchaseSource::Replay.as_str(), "replay");
    }
}
