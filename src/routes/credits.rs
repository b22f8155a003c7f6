use axum::{extract::State, Json};
use tracing::instrument;

use crate::{
    app_state::AppState,
    error::Result,
    middleware::AccountIdentity,
    models::{
        common::SuccessResponse,
        credits::{BalanceData, BalanceResponse, BatchListResponse, BatchView},
    },
};

/// GET /api/v1/credits/balance
#[instrument(skip(state, identity), fields(account_id = %identity.account_id))]
pub async fn get_balance(
    State(state): State<AppState>,
    identity: AccountIdentity,
) -> Result<Json<BalanceResponse>> {
    let snapshot = state.ledger.balance_snapshot(identity.account_id).await?;

    Ok(Json(SuccessResponse::new(BalanceData::from(snapshot))))
}

/// GET /api/v1/credits/batches
#[instrument(skip(state, identity), fields(account_id = %identity.account_id))]
pub async fn list_batches(
    State(state): State<AppState>,
    identity: AccountIdentity,
) -> Result<Json<BatchListResponse>> {
    let batches = state.ledger.list_batches(identity.account_id).await?;

    Ok(Json(SuccessResponse::new(
        batches.into_iter().map(BatchView::from).collect(),
    )))
}
