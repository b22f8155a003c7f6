use std::time::Duration;

use async_trait::async_trait;
use entity::sea_orm_active_enums::OrderStatus;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{config::ProductionConfig, error::ProviderError, models::orders::ActionDescriptor};

/// What the production side reported back for an accepted order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionReceipt {
    pub provider_ref: String,
    /// `Dispatched` for work queued with a producer, `Delivered` for synthesized audio
    pub status: OrderStatus,
}

/// The irreversible side of an order: queueing a producer or synthesizing audio
#[async_trait]
pub trait ProductionGateway: Send + Sync {
    async fn execute(
        &self,
        order_id: Uuid,
        account_id: Uuid,
        descriptor: &ActionDescriptor,
    ) -> Result<ProductionReceipt, ProviderError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchRequest<'a> {
    order_id: Uuid,
    account_id: Uuid,
    producer_id: &'a str,
    script: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisRequest<'a> {
    order_id: Uuid,
    voice_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AcceptedResponse {
    id: String,
}

/// HTTP client for the producer queue and the TTS endpoint
pub struct HttpProductionGateway {
    config: ProductionConfig,
    http_client: reqwest::Client,
}

impl HttpProductionGateway {
    const PROVIDER: &'static str = "production";

    pub fn new(config: &ProductionConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.action_timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Request {
                provider: Self::PROVIDER,
                message: e.to_string(),
            })?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<AcceptedResponse, ProviderError> {
        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: Self::PROVIDER,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: Self::PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| ProviderError::Decode {
            provider: Self::PROVIDER,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ProductionGateway for HttpProductionGateway {
    #[instrument(skip(self, descriptor), fields(kind = ?descriptor.kind()))]
    async fn execute(
        &self,
        order_id: Uuid,
        account_id: Uuid,
        descriptor: &ActionDescriptor,
    ) -> Result<ProductionReceipt, ProviderError> {
        let receipt = match descriptor {
            ActionDescriptor::HumanProduction {
                producer_id,
                script,
                notes,
            } => {
                let request = DispatchRequest {
                    order_id,
                    account_id,
                    producer_id,
                    script,
                    notes: notes.as_deref(),
                };
                let accepted = self
                    .post(self.http_client.post(&self.config.dispatch_url), &request)
                    .await?;
                ProductionReceipt {
                    provider_ref: accepted.id,
                    status: OrderStatus::Dispatched,
                }
            }
            ActionDescriptor::AiSynthesis { voice_id, text } => {
                let request = SynthesisRequest {
                    order_id,
                    voice_id,
                    text,
                };
                let mut builder = self.http_client.post(&self.config.tts_url);
                if let Some(ref api_key) = self.config.tts_api_key {
                    builder = builder.header("Authorization", format!("Bearer {}", api_key));
                }
                let accepted = self.post(builder, &request).await?;
                ProductionReceipt {
                    provider_ref: accepted.id,
                    status: OrderStatus::Delivered,
                }
            }
        };

        info!(
            order_id = %order_id,
            provider_ref = %receipt.provider_ref,
            "Production accepted order"
        );

        Ok(receipt)
    }
}
