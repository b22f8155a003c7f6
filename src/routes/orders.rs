use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::AccountIdentity,
    models::{
        common::SuccessResponse,
        orders::{
            OrderData, PlaceOrderRequest, PlaceOrderResponse, QuoteData, QuoteRequest,
            QuoteResponse,
        },
    },
    services::order_coordinator::OrderResult,
};

/// POST /api/v1/orders/quote
#[instrument(skip(state, identity, request), fields(account_id = %identity.account_id))]
pub async fn quote(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let (kind, cost) = state.order_service.quote(&request.action)?;
    let balance = state.ledger.get_balance(identity.account_id).await?;

    Ok(Json(SuccessResponse::new(QuoteData {
        kind,
        cost,
        balance,
        sufficient: balance >= cost,
    })))
}

/// POST /api/v1/orders
///
/// A failed production still answers 200: the order exists, its debit was
/// reversed and the body says so.
#[instrument(skip(state, identity, request), fields(account_id = %identity.account_id))]
pub async fn place_order(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let placed = state
        .order_service
        .place_order(identity.account_id, request.quoted_cost, request.action)
        .await?;

    if let OrderResult::InsufficientCredits {
        available,
        requested,
    } = placed.result
    {
        return Err(ApiError::InsufficientCredits {
            available,
            requested,
        });
    }

    Ok(Json(SuccessResponse::new(OrderData::from(placed))))
}
