//! Tenant initialization endpoint.
//!
//! Tenants are created explicitly by an operator, never implicitly on
//! first request. The generated API key is returned exactly once in the
//! creation response; only its hash is stored.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::middleware::auth::hash_api_key;
use crate::services::tenant;
use crate::state::AppState;

const MAX_TENANT_ID_CHARS: usize = 40;

/// Tenant creation request.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub id: String,
}

/// Handle `POST /api/tenants`.
///
/// # Process
///
/// 1. Require the configured admin bearer token; without `ADMIN_TOKEN` the
///    endpoint is disabled entirely
/// 2. Validate the tenant id as a lowercase slug (it becomes a path
///    segment and a directory name)
/// 3. Generate a random API key, store its hash, and return the key once
pub async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Some(expected) = state
        .settings
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty())
    else {
        return Err(AppError::InvalidApiKey);
    };

    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if provided != Some(expected) {
        tracing::warn!("rejected tenant creation with invalid admin token");
        return Err(AppError::InvalidApiKey);
    }

    let id = request.id.trim().to_ascii_lowercase();
    if !is_valid_tenant_id(&id) {
        return Err(AppError::InvalidRequest(
            "tenant id must be 1-40 lowercase letters, digits, '-' or '_'".to_string(),
        ));
    }

    let api_key = generate_api_key();
    let created = tenant::create_tenant(&state.pool, &id, &hash_api_key(&api_key)).await?;

    if !created {
        return Err(AppError::InvalidRequest("tenant already exists".to_string()));
    }

    tracing::info!(tenant = %id, "tenant created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "apiKey": api_key })),
    ))
}

/// Lowercase slug: letters, digits, hyphen, underscore.
fn is_valid_tenant_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TENANT_ID_CHARS
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// 256-bit random key, hex encoded.
fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_ids_are_validated_as_slugs() {
        assert!(is_valid_tenant_id("alice"));
        assert!(is_valid_tenant_id("stream-42_b"));

        assert!(!is_valid_tenant_id(""));
        assert!(!is_valid_tenant_id("Alice"));
        assert!(!is_valid_tenant_id("has space"));
        assert!(!is_valid_tenant_id("dot.dot"));
        assert!(!is_valid_tenant_id(&"a".repeat(41)));
    }

    #[test]
    fn api_keys_are_64_hex_chars_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();

        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
