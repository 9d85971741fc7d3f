use crate::error::ApiError;
use axum::http::HeaderMap;
use orc_core::{ApiKey, ApiKeyRole};
use orc_store::Store;
use sha2::{Digest, Sha256};

/// Salted SHA-256 of the raw key, matching what's stored in `api_keys.key_hash`
/// "raw API keys never stored").
pub fn hash_key(salt: &str, raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authenticates a request, returning the matched key. Bumps `last_used_at` opportunistically
/// without blocking the caller on its completion.
pub async fn authenticate(store: &Store, salt: &str, headers: &HeaderMap) -> Result<ApiKey, ApiError> {
    let raw_key = bearer_token(headers).ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let hash = hash_key(salt, raw_key);

    let key = orc_store::api_keys::find_active_by_hash(store.pool(), &hash)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired api key"))?;

    let pool = store.pool().clone();
    let id = key.id;
    tokio::spawn(async move {
        if let Err(err) = orc_store::api_keys::touch_last_used(&pool, id).await {
            tracing::warn!(error = %err, "failed to touch api key last_used_at");
        }
    });

    Ok(key)
}

pub fn require_role(key: &ApiKey, role: ApiKeyRole) -> Result<(), ApiError> {
    if key.role == role {
        Ok(())
    } else {
        Err(ApiError::unauthorized("insufficient role"))
    }
}
