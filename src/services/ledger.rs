//! Purchase ledger - durable store of completed purchase records.
//!
//! Writes are idempotent by order token: a repeated webhook for the same
//! token refreshes fields and `updated_at` on the existing row instead of
//! inserting a second one (`created_at` is set only on first insert).
//! Token-less synthetic purchases are plain inserts.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::purchase::{NewPurchase, Purchase};

const PURCHASE_COLUMNS: &str =
    "id, order_token, username, overlay_message, tts_message, tts_voice, \
     total_cents, items, source, created_at, updated_at";

/// Record a completed purchase.
///
/// With an order token the write is an upsert keyed by
/// `(tenant, order_token)`; without one it is a plain insert.
pub async fn record(pool: &DbPool, tenant: &str, purchase: &NewPurchase) -> Result<(), sqlx::Error> {
    match &purchase.order_token {
        Some(token) => {
            // Webhooks can repeat; the partial unique index makes the
            // conflict target valid only for token-carrying rows
            sqlx::query(
                r#"
                INSERT INTO purchases (
                    tenant_id, order_token, username, overlay_message, tts_message,
                    tts_voice, total_cents, items, source, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                ON CONFLICT (tenant_id, order_token) WHERE order_token IS NOT NULL
                DO UPDATE
                SET username = EXCLUDED.username,
                    overlay_message = EXCLUDED.overlay_message,
                    tts_message = EXCLUDED.tts_message,
                    tts_voice = EXCLUDED.tts_voice,
                    total_cents = EXCLUDED.total_cents,
                    items = EXCLUDED.items,
                    source = EXCLUDED.source,
                    updated_at = NOW()
                "#,
            )
            .bind(tenant)
            .bind(token)
            .bind(&purchase.username)
            .bind(&purchase.overlay_message)
            .bind(&purchase.tts_message)
            .bind(&purchase.tts_voice)
            .bind(purchase.total_cents)
            .bind(sqlx::types::Json(&purchase.items))
            .bind(purchase.source.as_str())
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO purchases (
                    tenant_id, username, overlay_message, tts_message, tts_voice,
                    total_cents, items, source, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                "#,
            )
            .bind(tenant)
            .bind(&purchase.username)
            .bind(&purchase.overlay_message)
            .bind(&purchase.tts_message)
            .bind(&purchase.tts_voice)
            .bind(purchase.total_cents)
            .bind(sqlx::types::Json(&purchase.items))
            .bind(purchase.source.as_str())
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Whether a purchase already exists for an order token.
///
/// The pipeline probes this before dispatching so a webhook retried after
/// its reservation was released cannot re-run game commands.
pub async fn exists(pool: &DbPool, tenant: &str, order_token: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM purchases WHERE tenant_id = $1 AND order_token = $2)",
    )
    .bind(tenant)
    .bind(order_token)
    .fetch_one(pool)
    .await
}

/// Fetch one stored purchase by id (replay).
pub async fn find(
    pool: &DbPool,
    tenant: &str,
    id: Uuid,
) -> Result<Option<Purchase>, sqlx::Error> {
    sqlx::query_as::<_, Purchase>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Most recent purchases, newest first, bounded.
pub async fn list_recent(
    pool: &DbPool,
    tenant: &str,
    limit: i64,
) -> Result<Vec<Purchase>, sqlx::Error> {
    sqlx::query_as::<_, Purchase>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases \
         WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(tenant)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Purchases inside a closed time range, oldest first, bounded.
///
/// Metrics aggregation over the result is a plain linear reduce done by
/// the caller; the time-range index keeps the scan cheap.
pub async fn in_range(
    pool: &DbPool,
    tenant: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Purchase>, sqlx::Error> {
    sqlx::query_as::<_, Purchase>(&format!(
        "SELECT {PURCHASE_COLUMNS} FROM purchases \
         WHERE tenant_id = $1 AND created_at >= $2 AND created_at <= $3 \
         ORDER BY created_at ASC LIMIT $4"
    ))
    .bind(tenant)
    .bind(from)
    .bind(to)
    .bind(limit)
    .fetch_all(pool)
    .await
}
