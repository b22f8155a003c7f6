//! Mercado Pago client: card charges, PIX charges, payment lookups and
//! webhook signature verification.

use std::time::Duration;

use entity::sea_orm_active_enums::BatchOrigin;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};

use crate::{
    config::MercadoPagoConfig,
    error::ProviderError,
    models::payments::{PaymentConfirmation, PaymentStatus, PixCharge},
};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER: &str = "mercadopago";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MercadoPagoPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    pub transaction_amount: Decimal,
    #[serde(default)]
    pub payment_type_id: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PointOfInteraction {
    #[serde(default)]
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransactionData {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_base64: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

impl MercadoPagoPayment {
    pub fn normalized_status(&self) -> PaymentStatus {
        map_status(&self.status)
    }

    /// Rail the payment belongs to; `None` for types we never sell through
    /// (boleto, account money, ...)
    pub fn origin(&self) -> Option<BatchOrigin> {
        match self.payment_type_id.as_deref() {
            Some("credit_card") | Some("debit_card") | Some("prepaid_card") => {
                Some(BatchOrigin::CardPayment)
            }
            _ if self.payment_method_id.as_deref() == Some("pix") => {
                Some(BatchOrigin::PixMercadopago)
            }
            _ => None,
        }
    }

    pub fn confirmation(&self) -> Option<PaymentConfirmation> {
        Some(self.confirmation_for(self.origin()?))
    }

    /// Confirmation under a rail already known from our own intent
    pub fn confirmation_for(&self, origin: BatchOrigin) -> PaymentConfirmation {
        PaymentConfirmation {
            origin,
            external_payment_id: self.id.to_string(),
            status: self.normalized_status(),
            amount: self.transaction_amount,
            reference: self.external_reference.clone(),
            status_detail: self.status_detail.clone(),
        }
    }

    pub fn pix_charge(&self, expires_in_seconds: u32) -> Option<PixCharge> {
        let data = self.point_of_interaction.as_ref()?.transaction_data.as_ref()?;
        Some(PixCharge {
            qr_code: data.qr_code.clone()?,
            qr_code_base64: data.qr_code_base64.clone(),
            ticket_url: data.ticket_url.clone(),
            expires_in_seconds: Some(expires_in_seconds),
        })
    }
}

/// Mercado Pago payment status to the normalized status
pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "approved" => PaymentStatus::Approved,
        "pending" | "in_process" | "in_mediation" | "authorized" => PaymentStatus::Pending,
        "cancelled" => PaymentStatus::Cancelled,
        // rejected, refunded, charged_back
        _ => PaymentStatus::Rejected,
    }
}

/// Body Mercado Pago posts to the notification URL
#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoNotification {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationData {
    pub id: serde_json::Value,
}

impl MercadoPagoNotification {
    pub fn is_payment(&self) -> bool {
        self.kind.as_deref() == Some("payment")
            || self
                .action
                .as_deref()
                .is_some_and(|a| a.starts_with("payment."))
    }

    /// `data.id` arrives as a string or a number depending on the API version
    pub fn payment_id(&self) -> Option<String> {
        match &self.data.as_ref()?.id {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Verify an `x-signature` header (`ts=...,v1=...`).
///
/// The signed manifest is `id:{data.id};request-id:{x-request-id};ts:{ts};`,
/// omitting parts that are absent from the request.
pub fn verify_signature(
    secret: &str,
    x_signature: &str,
    x_request_id: Option<&str>,
    data_id: Option<&str>,
) -> bool {
    let mut ts = None;
    let mut v1 = None;
    for part in x_signature.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };
    let Ok(expected) = hex::decode(v1) else {
        return false;
    };

    let mut manifest = String::new();
    if let Some(id) = data_id {
        // Alphanumeric ids are signed lowercased
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = x_request_id {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(manifest.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    description: &'a str,
    payment_method_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installments: Option<u32>,
    payer: Payer<'a>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_of_expiration: Option<String>,
}

/// A card charge, already tokenized by the client SDK
#[derive(Debug, Clone)]
pub struct CardCharge<'a> {
    pub reference: &'a str,
    pub amount: Decimal,
    pub description: &'a str,
    pub card_token: &'a str,
    pub payment_method_id: &'a str,
    pub installments: u32,
    pub payer_email: &'a str,
}

pub struct MercadoPagoClient {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    pub fn pix_expiration_seconds(&self) -> u32 {
        self.config.pix_expiration_minutes * 60
    }

    pub fn verify_notification(
        &self,
        x_signature: &str,
        x_request_id: Option<&str>,
        data_id: Option<&str>,
    ) -> bool {
        verify_signature(&self.config.webhook_secret, x_signature, x_request_id, data_id)
    }

    /// Charge a tokenized card. The reference doubles as the idempotency key,
    /// so a retried request never charges twice.
    #[instrument(skip(self, charge), fields(reference = charge.reference))]
    pub async fn create_card_payment(
        &self,
        charge: &CardCharge<'_>,
    ) -> Result<MercadoPagoPayment, ProviderError> {
        let request = CreatePaymentRequest {
            transaction_amount: charge.amount,
            description: charge.description,
            payment_method_id: charge.payment_method_id,
            token: Some(charge.card_token),
            installments: Some(charge.installments),
            payer: Payer {
                email: charge.payer_email,
            },
            external_reference: charge.reference,
            notification_url: self.config.notification_url.as_deref(),
            date_of_expiration: None,
        };

        let payment = self.create_payment(charge.reference, &request).await?;
        info!(
            payment_id = payment.id,
            status = %payment.status,
            "Mercado Pago card payment created"
        );
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn create_pix_payment(
        &self,
        reference: &str,
        amount: Decimal,
        description: &str,
        payer_email: &str,
    ) -> Result<MercadoPagoPayment, ProviderError> {
        let expires_at = time::OffsetDateTime::now_utc()
            + time::Duration::minutes(i64::from(self.config.pix_expiration_minutes));
        let date_of_expiration = expires_at
            .format(&time::format_description::well_known::Rfc3339)
            .ok();

        let request = CreatePaymentRequest {
            transaction_amount: amount,
            description,
            payment_method_id: "pix",
            token: None,
            installments: None,
            payer: Payer { email: payer_email },
            external_reference: reference,
            notification_url: self.config.notification_url.as_deref(),
            date_of_expiration,
        };

        let payment = self.create_payment(reference, &request).await?;
        info!(payment_id = payment.id, "Mercado Pago PIX payment created");
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: &str) -> Result<MercadoPagoPayment, ProviderError> {
        let response = self
            .http_client
            .get(format!("{}/v1/payments/{}", self.config.api_base, payment_id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(response).await
    }

    async fn create_payment(
        &self,
        idempotency_key: &str,
        request: &CreatePaymentRequest<'_>,
    ) -> Result<MercadoPagoPayment, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/v1/payments", self.config.api_base))
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(response).await
    }
}

fn request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Request {
        provider: PROVIDER,
        message: e.to_string(),
    }
}

async fn parse_response(response: reqwest::Response) -> Result<MercadoPagoPayment, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Mercado Pago request failed");
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(|e| ProviderError::Decode {
        provider: PROVIDER,
        message: e.to_string(),
    })
}
