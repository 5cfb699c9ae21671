//! Pending checkout registry - short-lived buyer reservations.
//!
//! Reservations are keyed by `(tenant, order token)` and expire after
//! [`CHECKOUT_TTL_MINUTES`](crate::models::checkout::CHECKOUT_TTL_MINUTES).
//! Every registry read prunes expired rows first, so abandoned checkouts
//! are garbage-collected lazily without a background job. All mutations
//! are single-statement upserts/deletes; there are no client-side
//! read-modify-write cycles.

use rand::Rng;

use crate::db::DbPool;
use crate::models::checkout::{CHECKOUT_TTL_MINUTES, NewReservation, PendingCheckout};

/// Order tokens avoid visually ambiguous symbols (no I/L/O/0/1).
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const TOKEN_LEN: usize = 8;

/// Generate a fresh opaque order token.
pub fn generate_order_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Upsert a reservation by order token.
///
/// `created_at` is assigned on first insert and preserved on conflict;
/// `expires_at` is refreshed to a full TTL either way. Expired rows are
/// pruned afterwards, mirroring the original registry's write path.
pub async fn reserve(
    pool: &DbPool,
    tenant: &str,
    reservation: &NewReservation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pending_checkouts (
            tenant_id, order_token, buyer_name, tts_message, tts_voice, items,
            created_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW() + make_interval(mins => $7))
        ON CONFLICT (tenant_id, order_token) DO UPDATE
        SET buyer_name = EXCLUDED.buyer_name,
            tts_message = EXCLUDED.tts_message,
            tts_voice = EXCLUDED.tts_voice,
            items = EXCLUDED.items,
            expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(tenant)
    .bind(&reservation.order_token)
    .bind(&reservation.buyer_name)
    .bind(&reservation.tts_message)
    .bind(&reservation.tts_voice)
    .bind(sqlx::types::Json(&reservation.items))
    .bind(CHECKOUT_TTL_MINUTES as i32)
    .execute(pool)
    .await?;

    prune(pool, tenant).await?;

    Ok(())
}

/// Look up a live (non-expired) reservation by order token.
///
/// Pruning runs first, as on every registry read; a row that survived the
/// bulk delete but expired in between is filtered out here as well.
pub async fn resolve(
    pool: &DbPool,
    tenant: &str,
    order_token: &str,
) -> Result<Option<PendingCheckout>, sqlx::Error> {
    prune(pool, tenant).await?;

    let reservation = sqlx::query_as::<_, PendingCheckout>(
        r#"
        SELECT order_token, buyer_name, tts_message, tts_voice, items, created_at, expires_at
        FROM pending_checkouts
        WHERE tenant_id = $1 AND order_token = $2
        "#,
    )
    .bind(tenant)
    .bind(order_token)
    .fetch_optional(pool)
    .await?;

    Ok(reservation.filter(|r| !r.is_expired(chrono::Utc::now())))
}

/// Delete a reservation. Deleting an absent token is not an error.
pub async fn release(pool: &DbPool, tenant: &str, order_token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM pending_checkouts WHERE tenant_id = $1 AND order_token = $2")
        .bind(tenant)
        .bind(order_token)
        .execute(pool)
        .await?;

    Ok(())
}

/// Bulk-remove expired reservations for a tenant.
///
/// A row is expired once its expiry has passed or its creation time fell
/// behind `now - TTL` (legacy rows without a refreshed expiry).
pub async fn prune(pool: &DbPool, tenant: &str) -> Result<u64, sqlx::Error> {
    let removed = sqlx::query(
        r#"
        DELETE FROM pending_checkouts
        WHERE tenant_id = $1
          AND (expires_at <= NOW() OR created_at <= NOW() - make_interval(mins => $2))
        "#,
    )
    .bind(tenant)
    .bind(CHECKOUT_TTL_MINUTES as i32)
    .execute(pool)
    .await?
    .rows_affected();

    if removed > 0 {
        tracing::info!(tenant, removed, "pruned expired checkouts");
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_tokens_use_only_the_unambiguous_alphabet() {
        for _ in 0..50 {
            let token = generate_order_token();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn order_tokens_are_collision_resistant_in_practice() {
        let tokens: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_order_token()).collect();
        // With 31^8 combinations, 1000 draws colliding would mean a broken RNG
        assert_eq!(tokens.len(), 1000);
    }
}
