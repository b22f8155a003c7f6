//! Banco Inter PIX client (cob API) and callback payloads.

use std::time::{Duration, Instant};

use entity::sea_orm_active_enums::BatchOrigin;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::InterConfig,
    error::ProviderError,
    models::payments::{PaymentConfirmation, PaymentStatus, PixCharge},
};

const PROVIDER: &str = "inter";
const SCOPES: &str = "cob.write cob.read";

/// New charge identifier; Inter accepts 26 to 35 alphanumerics
pub fn new_txid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Inter cob status to the normalized status
pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "CONCLUIDA" => PaymentStatus::Approved,
        "ATIVA" => PaymentStatus::Pending,
        // REMOVIDA_PELO_USUARIO_RECEBEDOR, REMOVIDA_PELO_PSP
        _ => PaymentStatus::Cancelled,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CobValue {
    pub original: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixEntry {
    pub end_to_end_id: String,
    #[serde(default)]
    pub txid: Option<String>,
    pub valor: Decimal,
    #[serde(default)]
    pub horario: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cob {
    pub txid: String,
    pub status: String,
    pub valor: CobValue,
    #[serde(default)]
    pub pix_copia_e_cola: Option<String>,
    #[serde(default)]
    pub pix: Vec<PixEntry>,
}

impl Cob {
    /// Paid amount when the charge was settled, the charged amount otherwise
    pub fn paid_amount(&self) -> Decimal {
        if self.pix.is_empty() {
            self.valor.original
        } else {
            self.pix.iter().map(|p| p.valor).sum()
        }
    }

    pub fn confirmation(&self) -> PaymentConfirmation {
        PaymentConfirmation {
            origin: BatchOrigin::PixInter,
            external_payment_id: self.txid.clone(),
            status: map_status(&self.status),
            amount: self.paid_amount(),
            reference: None,
            status_detail: Some(self.status.clone()),
        }
    }
}

/// Body Inter posts to the registered webhook
#[derive(Debug, Clone, Deserialize)]
pub struct InterCallback {
    #[serde(default)]
    pub pix: Vec<PixEntry>,
}

impl PixEntry {
    /// A received PIX is final; the callback only fires for settled transfers
    pub fn confirmation(&self) -> Option<PaymentConfirmation> {
        Some(PaymentConfirmation {
            origin: BatchOrigin::PixInter,
            external_payment_id: self.txid.clone()?,
            status: PaymentStatus::Approved,
            amount: self.valor,
            reference: None,
            status_detail: Some(format!("e2e:{}", self.end_to_end_id)),
        })
    }
}

#[derive(Debug, Serialize)]
struct Calendario {
    expiracao: u32,
}

#[derive(Debug, Serialize)]
struct Devedor<'a> {
    cpf: &'a str,
    nome: &'a str,
}

#[derive(Debug, Serialize)]
struct CobValueRequest {
    original: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCobRequest<'a> {
    calendario: Calendario,
    #[serde(skip_serializing_if = "Option::is_none")]
    devedor: Option<Devedor<'a>>,
    valor: CobValueRequest,
    chave: &'a str,
    solicitacao_pagador: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct InterClient {
    config: InterConfig,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl InterClient {
    pub fn new(config: &InterConfig) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(10));

        if let (Some(cert), Some(key)) = (&config.certificate_path, &config.private_key_path) {
            let mut pem = std::fs::read(cert).map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                message: format!("reading certificate {}: {}", cert, e),
            })?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key).map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                message: format!("reading private key {}: {}", key, e),
            })?);

            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                message: format!("invalid client identity: {}", e),
            })?;
            builder = builder.identity(identity);
        }

        let http_client = builder.build().map_err(request_error)?;

        Ok(Self {
            config: config.clone(),
            http_client,
            token: Mutex::new(None),
        })
    }

    pub fn pix_expiration_seconds(&self) -> u32 {
        self.config.pix_expiration_minutes * 60
    }

    pub fn confirms_callbacks(&self) -> bool {
        self.config.confirm_callbacks
    }

    pub fn webhook_token_matches(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| t == self.config.webhook_token)
    }

    /// OAuth2 client-credentials token, cached until shortly before expiry
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http_client
            .post(format!("{}/oauth/v2/token", self.config.api_base))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("scope", SCOPES),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let token: TokenResponse = parse_response(response).await?;
        debug!(expires_in = token.expires_in, "Obtained Inter access token");

        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    /// Create an immediate charge under `txid`
    #[instrument(skip(self, payer))]
    pub async fn create_cob(
        &self,
        txid: &str,
        amount: Decimal,
        description: &str,
        payer: Option<(&str, &str)>,
    ) -> Result<Cob, ProviderError> {
        let token = self.access_token().await?;
        let request = CreateCobRequest {
            calendario: Calendario {
                expiracao: self.pix_expiration_seconds(),
            },
            devedor: payer.map(|(cpf, nome)| Devedor { cpf, nome }),
            valor: CobValueRequest {
                original: format!("{:.2}", amount),
            },
            chave: &self.config.pix_key,
            solicitacao_pagador: description,
        };

        let response = self
            .http_client
            .put(format!("{}/pix/v2/cob/{}", self.config.api_base, txid))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let cob: Cob = parse_response(response).await?;
        info!(txid = %cob.txid, status = %cob.status, "Inter PIX charge created");
        Ok(cob)
    }

    #[instrument(skip(self))]
    pub async fn get_cob(&self, txid: &str) -> Result<Cob, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(format!("{}/pix/v2/cob/{}", self.config.api_base, txid))
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_error)?;

        parse_response(response).await
    }
}

impl Cob {
    pub fn pix_charge(&self, expires_in_seconds: u32) -> Option<PixCharge> {
        Some(PixCharge {
            qr_code: self.pix_copia_e_cola.clone()?,
            qr_code_base64: None,
            ticket_url: None,
            expires_in_seconds: Some(expires_in_seconds),
        })
    }
}

fn request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Request {
        provider: PROVIDER,
        message: e.to_string(),
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Inter request failed");
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
