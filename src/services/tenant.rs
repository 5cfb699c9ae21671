//! Config store - per-tenant configuration reads and targeted updates.
//!
//! `read_config` assembles the tenant row and product catalog into one
//! bundle and, as a side effect, lazily prunes expired checkout
//! reservations. Goal accumulation is a single atomic SQL increment; there
//! is no client-side read-modify-write, so concurrent purchases for the
//! same tenant cannot lose updates.

use std::collections::HashMap;

use crate::db::DbPool;
use crate::models::tenant::{Product, TenantConfig, TenantRow};
use crate::services::checkout;

/// Load the full configuration bundle for a tenant.
///
/// Returns `None` when the tenant does not exist. Expired checkout
/// reservations are pruned on every read.
pub async fn read_config(pool: &DbPool, tenant: &str) -> Result<Option<TenantConfig>, sqlx::Error> {
    let Some(row) = sqlx::query_as::<_, TenantRow>(
        r#"
        SELECT id, api_key_hash, webhook_secret, provider_handle, overlay_message,
               sound, tts_voice, rcon_host, rcon_port, rcon_password,
               goal_target_cents, goal_current_cents, goal_text_template,
               goal_text_position, goal_bar_bg_color, goal_bar_fill_color,
               goal_text_color, goal_show_currency
        FROM tenants
        WHERE id = $1
        "#,
    )
    .bind(tenant)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    // Registry housekeeping rides along with every config read
    checkout::prune(pool, tenant).await?;

    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT key, title, price_cents, commands, commands_per_unit, image
        FROM products
        WHERE tenant_id = $1
        "#,
    )
    .bind(tenant)
    .fetch_all(pool)
    .await?;

    let catalog: HashMap<String, Product> =
        products.into_iter().map(|p| (p.key.clone(), p)).collect();

    Ok(Some(TenantConfig::from_row(row, catalog)))
}

/// Add a purchase value to the tenant's fundraising goal.
///
/// Atomic at the storage layer (single UPDATE with an in-database
/// increment), clamped at zero. Callers skip this entirely for
/// non-positive values.
pub async fn add_to_goal(pool: &DbPool, tenant: &str, amount_cents: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE tenants
        SET goal_current_cents = GREATEST(0, goal_current_cents + $2)
        WHERE id = $1
        "#,
    )
    .bind(tenant)
    .bind(amount_cents)
    .execute(pool)
    .await?;

    Ok(())
}

/// Create a tenant with default configuration.
///
/// Returns `false` when the tenant already exists (the existing row is
/// left untouched).
pub async fn create_tenant(
    pool: &DbPool,
    tenant: &str,
    api_key_hash: &str,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO tenants (id, api_key_hash)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(tenant)
    .bind(api_key_hash)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}
