use axum::{
    extract::{Path, State},
    Json,
};
use entity::payment_intents;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::AccountIdentity,
    models::{
        common::SuccessResponse,
        payments::{
            CardPaymentRequest, IntentData, PaymentResultData, PaymentResultResponse,
            PixPaymentData, PixPaymentRequest, PixPaymentResponse,
        },
    },
    services::payment_service::ConfirmationOutcome,
};

async fn payment_result(
    state: &AppState,
    intent: payment_intents::Model,
    outcome: ConfirmationOutcome,
) -> Result<Json<PaymentResultResponse>> {
    let balance = state.ledger.get_balance(intent.account_id).await?;

    Ok(Json(SuccessResponse::new(PaymentResultData {
        outcome: outcome.label(),
        batch_id: outcome.batch_id(),
        intent: IntentData::from(intent),
        balance,
    })))
}

/// POST /api/v1/payments/card
#[instrument(skip(state, identity, request), fields(account_id = %identity.account_id))]
pub async fn pay_with_card(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<CardPaymentRequest>,
) -> Result<Json<PaymentResultResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let (intent, outcome) = state
        .payment_service
        .pay_with_card(identity.account_id, &request)
        .await?;

    payment_result(&state, intent, outcome).await
}

/// POST /api/v1/payments/pix/mercadopago
#[instrument(skip(state, identity, request), fields(account_id = %identity.account_id))]
pub async fn create_pix_mercadopago(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<PixPaymentRequest>,
) -> Result<Json<PixPaymentResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let (intent, pix) = state
        .payment_service
        .start_pix_mercadopago(identity.account_id, &request)
        .await?;

    Ok(Json(SuccessResponse::new(PixPaymentData {
        intent: IntentData::from(intent),
        pix,
    })))
}

/// POST /api/v1/payments/pix/inter
#[instrument(skip(state, identity, request), fields(account_id = %identity.account_id))]
pub async fn create_pix_inter(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Json(request): Json<PixPaymentRequest>,
) -> Result<Json<PixPaymentResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let (intent, pix) = state
        .payment_service
        .start_pix_inter(identity.account_id, &request)
        .await?;

    Ok(Json(SuccessResponse::new(PixPaymentData {
        intent: IntentData::from(intent),
        pix,
    })))
}

/// POST /api/v1/payments/{intent_id}/sync
///
/// Polling fallback for clients that do not want to wait for the webhook.
#[instrument(skip(state, identity), fields(account_id = %identity.account_id))]
pub async fn sync_intent(
    State(state): State<AppState>,
    identity: AccountIdentity,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<PaymentResultResponse>> {
    let (intent, outcome) = state
        .payment_service
        .sync_intent(identity.account_id, intent_id)
        .await?;

    payment_result(&state, intent, outcome).await
}
