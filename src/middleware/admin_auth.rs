//! Operator authentication for the admin surface.

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::warn;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Requires the configured admin key in the `X-Admin-Key` header
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing X-Admin-Key header".to_string()))?;

    if !keys_match(provided, &state.config.admin.api_key) {
        warn!(uri = %request.uri(), "Rejected admin request with wrong key");
        return Err(ApiError::Unauthorized("Invalid admin key".to_string()));
    }

    Ok(next.run(request).await)
}

/// Compares digests so the comparison time does not depend on the key prefix
fn keys_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}
