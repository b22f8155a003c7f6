//! Bearer tokens naming a ledger account.
//!
//! Tokens are issued by the marketplace's auth service with a shared HS256
//! secret; `sub` carries the ledger account id.

use crate::{
    config::AuthConfig,
    error::{ApiError, Result},
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Ledger account id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

pub struct JWTService {
    config: Arc<AuthConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JWTService {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        let secret = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            config,
        }
    }

    /// Issue a token for an account, as the auth service would.
    /// Used by operator tooling and tests.
    pub fn generate_token(&self, account_id: Uuid) -> Result<String> {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let lifetime = i64::try_from(self.config.access_token_expiration_minutes)
            .unwrap_or(i64::MAX / 60)
            .saturating_mul(60);

        let claims = Claims {
            sub: account_id.to_string(),
            iss: self.config.issuer.clone(),
            iat,
            exp: iat.saturating_add(lifetime),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(e.into()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::ExpiredToken,
                ErrorKind::InvalidIssuer => ApiError::InvalidToken("Unknown token issuer".to_string()),
                _ => ApiError::InvalidToken(e.to_string()),
            })
    }

    pub fn account_id_from_claims(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::InvalidToken(format!("Subject is not an account id: {}", claims.sub)))
    }
}
