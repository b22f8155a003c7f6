use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    services::jwt_service::JWTService,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

/// Verified ledger account behind the request's bearer token
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    pub account_id: Uuid,
}

/// `Bearer <token>`, scheme matched case-insensitively
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolves the bearer token to an [`AccountIdentity`] stored in request
/// extensions. 401 when the header is missing or the token does not verify.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = bearer_token(header).ok_or_else(|| {
        ApiError::InvalidToken("Expected 'Authorization: Bearer <token>'".to_string())
    })?;

    let claims = state.jwt_service.validate_token(token)?;
    let account_id = JWTService::account_id_from_claims(&claims)?;
    debug!(account_id = %account_id, "Authenticated ledger account");

    request
        .extensions_mut()
        .insert(AccountIdentity { account_id });

    Ok(next.run(request).await)
}

/// Only works on routes protected by jwt_auth_middleware.
impl<S> FromRequestParts<S> for AccountIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccountIdentity>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "Account identity not found - route must be protected by jwt_auth_middleware"
                        .to_string(),
                )
            })
    }
}
