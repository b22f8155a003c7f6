use entity::sea_orm_active_enums::{BatchOrigin, IntentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::SuccessResponse;

/// Provider payment state, normalized across rails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_intent_status(&self) -> IntentStatus {
        match self {
            Self::Approved => IntentStatus::Approved,
            Self::Pending => IntentStatus::Pending,
            Self::Rejected => IntentStatus::Rejected,
            Self::Cancelled => IntentStatus::Cancelled,
        }
    }
}

/// What every payment adapter reports, whatever the rail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub origin: BatchOrigin,
    /// Provider's payment identifier; the idempotency key together with `origin`
    pub external_payment_id: String,
    pub status: PaymentStatus,
    /// Amount paid, in BRL
    pub amount: Decimal,
    /// Our payment intent id as echoed back by the provider, when it supports one
    pub reference: Option<String>,
    pub status_detail: Option<String>,
}

/// BRL cents to a decimal amount (1990 -> 19.90)
pub fn cents_to_brl(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub package_id: String,

    /// Card token produced client-side by the Mercado Pago SDK
    #[validate(length(min = 1, max = 255))]
    pub card_token: String,

    /// Card brand as reported by the SDK (visa, master, ...)
    #[validate(length(min = 1, max = 32))]
    pub payment_method_id: String,

    #[validate(range(min = 1, max = 12))]
    pub installments: Option<u32>,

    #[validate(email)]
    pub payer_email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PixPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub package_id: String,

    #[validate(email)]
    pub payer_email: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub payer_name: Option<String>,

    /// CPF of the payer, digits only
    #[validate(length(equal = 11))]
    pub payer_cpf: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    pub intent_id: Uuid,
    pub origin: BatchOrigin,
    pub package_id: String,
    pub credits: i64,
    pub price_cents: i64,
    pub status: IntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_payment_id: Option<String>,
}

impl From<entity::payment_intents::Model> for IntentData {
    fn from(intent: entity::payment_intents::Model) -> Self {
        Self {
            intent_id: intent.id,
            origin: intent.origin,
            package_id: intent.package_id,
            credits: intent.credits,
            price_cents: intent.price_cents,
            status: intent.status,
            status_detail: intent.status_detail,
            external_payment_id: intent.external_payment_id,
        }
    }
}

/// PIX charge the client shows to the payer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixCharge {
    /// "Copia e cola" payload
    pub qr_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u32>,
}

pub type PixPaymentResponse = SuccessResponse<PixPaymentData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixPaymentData {
    pub intent: IntentData,
    pub pix: PixCharge,
}

pub type PaymentResultResponse = SuccessResponse<PaymentResultData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResultData {
    pub intent: IntentData,
    /// `credited`, `duplicate_ignored`, `pending`, `rejected`, `amount_mismatch`, ...
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub balance: i64,
}
