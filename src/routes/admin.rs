use axum::{
    extract::{Path, State},
    Json,
};
use entity::sea_orm_active_enums::BatchOrigin;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        admin::{
            AccountData, AccountResponse, BatchResponse, CreateAccountRequest, DebitData,
            DebitResponse, GrantRequest, ReversalData, ReversalResponse, ReverseRequest,
            SettlementRecordData, SettlementRecordResponse, SweepResponse, VoidRequest,
        },
        common::SuccessResponse,
        credits::{BalanceData, BalanceResponse, BatchView},
    },
};

/// POST /api/v1/admin/accounts
#[instrument(skip(state, request))]
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let (account, created) = state
        .account_service
        .ensure_account(
            &request.external_ref,
            request.display_name.as_deref(),
            request.email.as_deref(),
        )
        .await?;

    Ok(Json(SuccessResponse::new(AccountData::new(account, created))))
}

/// GET /api/v1/admin/accounts/{account_id}/balance
#[instrument(skip(state))]
pub async fn account_balance(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>> {
    state.account_service.get(account_id).await?;
    let snapshot = state.ledger.balance_snapshot(account_id).await?;

    Ok(Json(SuccessResponse::new(BalanceData::from(snapshot))))
}

/// POST /api/v1/admin/grants
///
/// Grants never carry an external payment id, so each call adds a new batch.
#[instrument(skip(state, request))]
pub async fn grant_credits(
    State(state): State<AppState>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<BatchResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let now = OffsetDateTime::now_utc();
    let expires_at = request.resolve_expiry(now);
    if expires_at.is_some_and(|at| at <= now) {
        return Err(ApiError::BadRequest(
            "expiresAt must be in the future".to_string(),
        ));
    }

    let batch = state
        .ledger
        .credit(request.account_id, request.amount, request.origin, None, expires_at)
        .await?;

    info!(
        account_id = %request.account_id,
        batch_id = %batch.id,
        amount = request.amount,
        origin = request.origin.as_str(),
        "Operator granted credits"
    );

    Ok(Json(SuccessResponse::new(BatchView::from(batch))))
}

/// POST /api/v1/admin/batches/{batch_id}/void
#[instrument(skip(state, request))]
pub async fn void_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<VoidRequest>,
) -> Result<Json<BatchResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let batch = state.ledger.void_batch(batch_id, &request.reason).await?;

    Ok(Json(SuccessResponse::new(BatchView::from(batch))))
}

/// GET /api/v1/admin/debits/{debit_id}
#[instrument(skip(state))]
pub async fn get_debit(
    State(state): State<AppState>,
    Path(debit_id): Path<Uuid>,
) -> Result<Json<DebitResponse>> {
    let view = state.ledger.get_debit(debit_id).await?;

    Ok(Json(SuccessResponse::new(DebitData::from(view))))
}

/// POST /api/v1/admin/debits/{debit_id}/reverse
#[instrument(skip(state, request))]
pub async fn reverse_debit(
    State(state): State<AppState>,
    Path(debit_id): Path<Uuid>,
    Json(request): Json<ReverseRequest>,
) -> Result<Json<ReversalResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let reason = request.reason.as_deref().unwrap_or("operator reversal");
    let reversal = state.ledger.reverse(debit_id, Some(reason)).await?;

    Ok(Json(SuccessResponse::new(ReversalData { debit_id, reversal })))
}

/// GET /api/v1/admin/settlements/{origin}/{external_payment_id}
#[instrument(skip(state))]
pub async fn get_settlement(
    State(state): State<AppState>,
    Path((origin, external_payment_id)): Path<(String, String)>,
) -> Result<Json<SettlementRecordResponse>> {
    let origin = BatchOrigin::from_str(&origin)
        .filter(BatchOrigin::is_payment_rail)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown payment origin: {}", origin)))?;

    let record = state
        .settlement_service
        .find_record(origin, &external_payment_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No settlement for {}:{}",
                origin.as_str(),
                external_payment_id
            ))
        })?;

    Ok(Json(SuccessResponse::new(SettlementRecordData::from(record))))
}

/// POST /api/v1/admin/sweep
#[instrument(skip(state))]
pub async fn sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let report = state.sweeper.sweep(OffsetDateTime::now_utc()).await?;

    Ok(Json(SuccessResponse::new(report)))
}
