//! Rate limiting of payment intent creation, backed by Redis.
//!
//! Fixed window counter per account. Only mounted when Redis is configured.

use crate::{
    config::RedisConfig,
    error::{ApiError, Result},
    middleware::jwt_auth::AccountIdentity,
};
use axum::{extract::Request, middleware::Next, response::Response};
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Intents an account may open per window
    pub limit: u32,
    pub window_seconds: u32,
}

impl From<&RedisConfig> for RateLimitConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            limit: config.intents_per_window,
            window_seconds: config.window_seconds,
        }
    }
}

/// Returns 429 Too Many Requests once the account exhausts its window.
pub fn rate_limit_middleware(
    redis_client: Arc<Client>,
    config: RateLimitConfig,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response>> + Send>>
       + Clone {
    move |request: Request, next: Next| {
        let redis_client = redis_client.clone();
        let config = config.clone();

        Box::pin(async move {
            let identity = request
                .extensions()
                .get::<AccountIdentity>()
                .cloned()
                .ok_or_else(|| {
                    ApiError::Internal(anyhow::anyhow!(
                        "Rate limit middleware requires jwt_auth_middleware"
                    ))
                })?;

            let now = OffsetDateTime::now_utc().unix_timestamp();
            let key = window_key(&identity.account_id.to_string(), now, config.window_seconds);
            let count = increment_window(&redis_client, &key, config.window_seconds).await?;

            if count > u64::from(config.limit) {
                warn!(
                    account_id = %identity.account_id,
                    count,
                    limit = config.limit,
                    "Payment intent rate limit exceeded"
                );
                return Err(ApiError::RateLimitExceeded);
            }

            debug!(account_id = %identity.account_id, count, "Rate limit check passed");
            Ok(next.run(request).await)
        })
    }
}

/// Redis key of the window containing `now`
fn window_key(account_id: &str, now: i64, window_seconds: u32) -> String {
    let window = now.div_euclid(i64::from(window_seconds.max(1)));
    format!("rate_limit:intents:{}:{}", account_id, window)
}

async fn increment_window(redis_client: &Client, key: &str, window_seconds: u32) -> Result<u64> {
    let mut conn = redis_client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis connection failed: {}", e)))?;

    let count: u64 = conn
        .incr(key, 1)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis INCR failed: {}", e)))?;

    if count == 1 {
        let _: () = conn
            .expire(key, i64::from(window_seconds) + 10)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Redis EXPIRE failed: {}", e)))?;
    }

    Ok(count)
}

pub fn create_rate_limiter(
    redis_client: Arc<Client>,
    config: &RedisConfig,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response>> + Send>>
       + Clone {
    rate_limit_middleware(redis_client, RateLimitConfig::from(config))
}
