use entity::sea_orm_active_enums::{OrderKind, OrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::services::{
    ledger_service::{Allocation, ReversalOutcome},
    order_coordinator::OrderResult,
    order_service::PlacedOrder,
};

use super::common::SuccessResponse;

/// What an order asks the outside world to do once credits are reserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDescriptor {
    /// Hand a script to a human voice producer
    #[serde(rename_all = "camelCase")]
    HumanProduction {
        producer_id: String,
        script: String,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Synthesize the text with an AI voice
    #[serde(rename_all = "camelCase")]
    AiSynthesis { voice_id: String, text: String },
}

impl ActionDescriptor {
    pub fn kind(&self) -> OrderKind {
        match self {
            Self::HumanProduction { .. } => OrderKind::HumanProduction,
            Self::AiSynthesis { .. } => OrderKind::AiSynthesis,
        }
    }
}

fn validate_descriptor(descriptor: &ActionDescriptor) -> Result<(), ValidationError> {
    let (id, body) = match descriptor {
        ActionDescriptor::HumanProduction {
            producer_id,
            script,
            ..
        } => (producer_id, script),
        ActionDescriptor::AiSynthesis { voice_id, text } => (voice_id, text),
    };

    if id.trim().is_empty() || id.len() > 100 {
        return Err(ValidationError::new("invalid_target_id"));
    }
    if body.trim().is_empty() {
        return Err(ValidationError::new("empty_content"));
    }
    if body.len() > 200_000 {
        return Err(ValidationError::new("content_too_long"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[validate(custom(function = "validate_descriptor"))]
    pub action: ActionDescriptor,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    /// Cost the client was shown; the order is refused if the price moved
    #[validate(range(min = 0))]
    pub quoted_cost: Option<i64>,

    #[validate(custom(function = "validate_descriptor"))]
    pub action: ActionDescriptor,
}

pub type QuoteResponse = SuccessResponse<QuoteData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteData {
    pub kind: OrderKind,
    pub cost: i64,
    pub balance: i64,
    pub sufficient: bool,
}

pub type PlaceOrderResponse = SuccessResponse<OrderData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub order_id: Uuid,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub cost: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<Allocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal: Option<ReversalOutcome>,
}

impl From<PlacedOrder> for OrderData {
    fn from(placed: PlacedOrder) -> Self {
        let order = placed.order;
        let (allocations, reversal) = match placed.result {
            OrderResult::Completed { debit, .. } => (debit.allocations, None),
            OrderResult::Failed { reversal, .. } => (Vec::new(), reversal),
            OrderResult::InsufficientCredits { .. } => (Vec::new(), None),
        };

        Self {
            order_id: order.id,
            kind: order.kind,
            status: order.status,
            cost: order.cost,
            debit_id: order.debit_id,
            provider_ref: order.provider_ref,
            failure_reason: order.failure_reason,
            allocations,
            reversal,
        }
    }
}
