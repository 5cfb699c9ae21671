//! API key authentication middleware.
//!
//! Gated routes require `Authorization: Bearer <api_key>`; the key is
//! hashed with SHA-256 and compared against the stored hash of the tenant
//! named in the path. Only the hash ever touches the database, so a key is
//! never persisted or logged in clear text.

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

/// Identity of the authenticated tenant, inserted into request extensions
/// for downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: String,
}

/// Hex SHA-256 of an API key, the only form the database stores.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Authenticate a gated request against the tenant in the path.
///
/// # Process
///
/// 1. Extract the bearer token from the `Authorization` header
/// 2. Hash it and look up a tenant row matching both the path tenant and
///    the hash in one query
/// 3. On a match, insert [`AuthContext`] and continue; otherwise reject
///    with 401 without revealing whether the tenant exists
pub async fn auth_middleware(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AppError::InvalidApiKey)?;

    let hash = hash_api_key(key);

    let matched = sqlx::query_scalar::<_, String>(
        "SELECT id FROM tenants WHERE id = $1 AND api_key_hash = $2",
    )
    .bind(&tenant)
    .bind(&hash)
    .fetch_optional(&state.pool)
    .await?;

    let Some(tenant_id) = matched else {
        tracing::warn!(tenant, "rejected request with invalid API key");
        return Err(AppError::InvalidApiKey);
    };

    let context = AuthContext { tenant_id };
    tracing::debug!(tenant = %context.tenant_id, "request authenticated");
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_hash_is_hex_sha256() {
        // sha256("secret")
        assert_eq!(
            hash_api_key("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }
}
