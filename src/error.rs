use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use uuid::Uuid;

/// Failures of the ledger, settlement and order components.
///
/// Expected business outcomes (insufficient credits) are named variants so
/// callers can branch on them; duplicate payments are not errors at all and
/// surface as `SettleResult::DuplicateIgnored`.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { available: i64, requested: i64 },

    #[error("external action failed: {0}")]
    ExternalActionFailed(String),

    /// Transient; retry the whole operation, never a part of it
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("debit transaction not found: {0}")]
    DebitNotFound(Uuid),

    #[error("payment intent not found: {0}")]
    IntentNotFound(String),

    #[error("quote mismatch: quoted {quoted}, current price {actual}")]
    QuoteMismatch { quoted: i64, actual: i64 },

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Webhook whose signature or token does not verify
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("reversal of debit {debit_id} failed: {reason}")]
    ReversalFailed { debit_id: Uuid, reason: String },

    #[error("database error: {0}")]
    Database(DbErr),
}

impl LedgerError {
    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict(_))
    }
}

impl From<DbErr> for LedgerError {
    fn from(err: DbErr) -> Self {
        if is_transient_db_error(&err) {
            LedgerError::StorageConflict(err.to_string())
        } else {
            LedgerError::Database(err)
        }
    }
}

/// Serialization failures, deadlocks and lock timeouts: the transaction was
/// rolled back as a whole and can be re-run.
pub fn is_transient_db_error(err: &DbErr) -> bool {
    let text = err.to_string().to_lowercase();
    text.contains("40001")
        || text.contains("40p01")
        || text.contains("could not serialize")
        || text.contains("deadlock detected")
        || text.contains("database is locked")
        || text.contains("database is busy")
        || text.contains("pool timed out")
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors raised talking to payment rails or production endpoints
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} is not configured")]
    NotConfigured { provider: &'static str },

    #[error("{provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be parsed: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { available: i64, requested: i64 },

    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidPayment(_)
            | LedgerError::InvalidOrder(_) => ApiError::BadRequest(err.to_string()),
            LedgerError::InsufficientCredits {
                available,
                requested,
            } => ApiError::InsufficientCredits {
                available,
                requested,
            },
            LedgerError::StorageConflict(msg) => ApiError::StorageConflict(msg),
            LedgerError::AccountNotFound(_)
            | LedgerError::BatchNotFound(_)
            | LedgerError::DebitNotFound(_)
            | LedgerError::IntentNotFound(_) => ApiError::NotFound(err.to_string()),
            LedgerError::QuoteMismatch { .. } => ApiError::Conflict(err.to_string()),
            LedgerError::Provider(e) => ApiError::PaymentProvider(e.to_string()),
            LedgerError::InvalidSignature(msg) => ApiError::InvalidSignature(msg),
            LedgerError::Database(e) => ApiError::Database(e),
            LedgerError::ExternalActionFailed(_) | LedgerError::ReversalFailed { .. } => {
                ApiError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::InsufficientCredits { .. } => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_CREDITS",
                self.to_string(),
            ),
            ApiError::StorageConflict(ref msg) => {
                tracing::warn!("Storage conflict: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_CONFLICT",
                    "The operation conflicted with a concurrent update, please retry".to_string(),
                )
            }
            ApiError::PaymentProvider(ref msg) => {
                tracing::error!("Payment provider error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "PAYMENT_PROVIDER_ERROR",
                    "Payment provider temporarily unavailable".to_string(),
                )
            }
            ApiError::InvalidSignature(ref msg) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                msg.clone(),
            ),
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::InvalidToken(ref msg) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", msg.clone())
            }
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Access token has expired".to_string(),
            ),
            ApiError::Conflict(ref msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests, please try again later".to_string(),
            ),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let retryable = status == StatusCode::SERVICE_UNAVAILABLE;
        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
                "retryable": retryable,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
