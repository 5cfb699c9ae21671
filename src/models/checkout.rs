//! Pending checkout (buyer reservation) model.
//!
//! A reservation bridges checkout creation and webhook delivery: the payment
//! provider's webhook typically carries only an order token, and the
//! reservation is what lets the pipeline recover who bought and what should
//! be spoken. Reservations expire after a fixed TTL so abandoned checkouts
//! do not accumulate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// How long a reservation stays live after creation.
///
/// Mirrored by the interval literals in the registry SQL.
pub const CHECKOUT_TTL_MINUTES: i64 = 30;

pub fn checkout_ttl() -> Duration {
    Duration::minutes(CHECKOUT_TTL_MINUTES)
}

/// One reserved line item: description, quantity, unit price in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub description: String,
    pub quantity: i64,
    pub price_cents: i64,
}

/// A live buyer reservation, keyed by order token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingCheckout {
    pub order_token: String,
    pub buyer_name: String,
    pub tts_message: String,
    pub tts_voice: Option<String>,
    pub items: Json<Vec<CheckoutItem>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingCheckout {
    /// Expiry predicate: a reservation is dead once its expiry has passed
    /// or its creation time fell behind the TTL cutoff.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now || self.created_at <= now - checkout_ttl()
    }
}

/// Fields supplied when reserving a buyer at checkout-creation time.
///
/// `created_at`/`expires_at` are assigned by the registry on insert.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub order_token: String,
    pub buyer_name: String,
    pub tts_message: String,
    pub tts_voice: Option<String>,
    pub items: Vec<CheckoutItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> PendingCheckout {
        PendingCheckout {
            order_token: "ABC123".to_string(),
            buyer_name: "Maria".to_string(),
            tts_message: "oi!".to_string(),
            tts_voice: None,
            items: Json(vec![]),
            created_at,
            expires_at,
        }
    }

    #[test]
    fn fresh_reservation_is_live() {
        let now = Utc::now();
        let r = reservation(now, now + Duration::minutes(30));
        assert!(!r.is_expired(now));
    }

    #[test]
    fn reservation_dies_at_its_expiry_instant() {
        let now = Utc::now();
        let r = reservation(now - Duration::minutes(30), now);
        assert!(r.is_expired(now));
    }

    #[test]
    fn reservation_dies_once_creation_falls_behind_the_ttl_cutoff() {
        let now = Utc::now();
        // Expiry still in the future, but creation is past the cutoff
        let r = reservation(now - Duration::minutes(31), now + Duration::minutes(5));
        assert!(r.is_expired(now));
    }
}
