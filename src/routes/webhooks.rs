//! Provider callbacks. Unauthenticated at the JWT layer; each rail proves
//! itself (Mercado Pago signs, Inter presents the shared token).

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, instrument};

use crate::{
    app_state::AppState,
    error::Result,
    models::common::WebhookAck,
    services::{
        inter_service::InterCallback, mercadopago_service::MercadoPagoNotification,
        payment_service::ConfirmationOutcome,
    },
};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn ack(outcome: &ConfirmationOutcome) -> WebhookAck {
    let ack = WebhookAck::new(outcome.label());
    match outcome {
        ConfirmationOutcome::Ignored(detail) => ack.with_detail(detail.clone()),
        ConfirmationOutcome::AmountMismatch { expected, received } => {
            ack.with_detail(format!("expected {}, received {}", expected, received))
        }
        _ => ack,
    }
}

/// POST /webhooks/mercadopago
#[instrument(skip_all)]
pub async fn mercadopago(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(notification): Json<MercadoPagoNotification>,
) -> Result<Json<WebhookAck>> {
    let outcome = state
        .payment_service
        .handle_mercadopago_notification(
            header(&headers, "x-signature"),
            header(&headers, "x-request-id"),
            query.get("data.id").map(String::as_str),
            notification,
        )
        .await?;

    info!(outcome = outcome.label(), "Processed Mercado Pago notification");
    Ok(Json(ack(&outcome)))
}

/// POST /webhooks/inter
#[instrument(skip_all)]
pub async fn inter(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    Json(callback): Json<InterCallback>,
) -> Result<Json<WebhookAck>> {
    let outcomes = state
        .payment_service
        .handle_inter_callback(query.get("token").map(String::as_str), callback)
        .await?;

    info!(entries = outcomes.len(), "Processed Inter callback");

    let ack = match outcomes.as_slice() {
        [] => WebhookAck::new("ignored").with_detail("no charge to settle"),
        [single] => ack(single),
        many => WebhookAck::new("processed").with_detail(
            many.iter()
                .map(|o| o.label())
                .collect::<Vec<_>>()
                .join(","),
        ),
    };

    Ok(Json(ack))
}
