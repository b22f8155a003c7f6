//! Purchase intents and the funnel from every payment rail into settlement.
//!
//! Card charges, Mercado Pago notifications, Inter callbacks and client
//! polling all end up in [`PaymentService::handle_confirmation`], which is
//! the only place that calls `settle`.

use std::sync::Arc;

use entity::{
    accounts, payment_intents,
    sea_orm_active_enums::{BatchOrigin, IntentStatus},
};
use rust_decimal::Decimal;
use sea_orm::{entity::*, query::*, DatabaseConnection};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{CreditPackage, CreditsConfig},
    error::{LedgerError, LedgerResult, ProviderError},
    models::payments::{
        cents_to_brl, CardPaymentRequest, PaymentConfirmation, PaymentStatus, PixCharge,
        PixPaymentRequest,
    },
    services::{
        inter_service::{new_txid, InterCallback, InterClient},
        mercadopago_service::{CardCharge, MercadoPagoClient, MercadoPagoNotification},
        settlement_service::{SettleResult, SettlementService},
    },
};

/// What processing one provider confirmation led to
#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Settled(SettleResult),
    Pending,
    /// Provider reported the payment rejected or cancelled
    Declined(PaymentStatus),
    AmountMismatch { expected: Decimal, received: Decimal },
    /// No intent matches the payment
    UnknownPayment,
    Ignored(String),
}

impl ConfirmationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Settled(result) => result.outcome(),
            Self::Pending => "pending",
            Self::Declined(_) => "rejected",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::UnknownPayment => "unknown_payment",
            Self::Ignored(_) => "ignored",
        }
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            Self::Settled(SettleResult::Credited { batch, .. }) => Some(batch.id),
            Self::Settled(SettleResult::DuplicateIgnored { record }) => record.batch_id,
            _ => None,
        }
    }
}

pub struct PaymentService {
    db: DatabaseConnection,
    settlement: SettlementService,
    credits: CreditsConfig,
    mercadopago: Option<Arc<MercadoPagoClient>>,
    inter: Option<Arc<InterClient>>,
}

impl PaymentService {
    pub fn new(
        db: DatabaseConnection,
        credits: CreditsConfig,
        mercadopago: Option<Arc<MercadoPagoClient>>,
        inter: Option<Arc<InterClient>>,
    ) -> Self {
        let settlement = SettlementService::new(db.clone());
        Self {
            db,
            settlement,
            credits,
            mercadopago,
            inter,
        }
    }

    fn mercadopago(&self) -> LedgerResult<&MercadoPagoClient> {
        self.mercadopago.as_deref().ok_or(LedgerError::Provider(
            ProviderError::NotConfigured {
                provider: "mercadopago",
            },
        ))
    }

    fn inter(&self) -> LedgerResult<&InterClient> {
        self.inter.as_deref().ok_or(LedgerError::Provider(
            ProviderError::NotConfigured { provider: "inter" },
        ))
    }

    fn package(&self, package_id: &str) -> LedgerResult<&CreditPackage> {
        self.credits
            .package(package_id)
            .ok_or_else(|| LedgerError::InvalidPayment(format!("unknown package {}", package_id)))
    }

    fn purchase_expiry(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.credits
            .purchase_validity_days
            .map(|days| now + time::Duration::days(i64::from(days)))
    }

    /// Open a purchase intent for one credit package
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        account_id: Uuid,
        origin: BatchOrigin,
        package_id: &str,
    ) -> LedgerResult<payment_intents::Model> {
        if !origin.is_payment_rail() {
            return Err(LedgerError::InvalidPayment(format!(
                "{} is not a payment rail",
                origin.as_str()
            )));
        }
        let package = self.package(package_id)?.clone();

        accounts::Entity::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let intent = payment_intents::ActiveModel {
            id: Set(Uuid::now_v7()),
            account_id: Set(account_id),
            origin: Set(origin),
            package_id: Set(package.id),
            credits: Set(package.credits),
            price_cents: Set(package.price_cents),
            external_payment_id: Set(None),
            status: Set(IntentStatus::Pending),
            status_detail: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        info!(
            intent_id = %intent.id,
            account_id = %account_id,
            origin = origin.as_str(),
            credits = intent.credits,
            "Created payment intent"
        );

        Ok(intent)
    }

    pub async fn get_intent(&self, intent_id: Uuid) -> LedgerResult<payment_intents::Model> {
        payment_intents::Entity::find_by_id(intent_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::IntentNotFound(intent_id.to_string()))
    }

    /// Charge a tokenized card; an approved charge is settled before returning
    #[instrument(skip(self, request), fields(package_id = %request.package_id))]
    pub async fn pay_with_card(
        &self,
        account_id: Uuid,
        request: &CardPaymentRequest,
    ) -> LedgerResult<(payment_intents::Model, ConfirmationOutcome)> {
        let mercadopago = self.mercadopago()?;
        let intent = self
            .create_intent(account_id, BatchOrigin::CardPayment, &request.package_id)
            .await?;
        let reference = intent.id.to_string();
        let description = format!("{} credits", intent.credits);

        let charge = CardCharge {
            reference: &reference,
            amount: cents_to_brl(intent.price_cents),
            description: &description,
            card_token: &request.card_token,
            payment_method_id: &request.payment_method_id,
            installments: request.installments.unwrap_or(1),
            payer_email: &request.payer_email,
        };

        let payment = match mercadopago.create_card_payment(&charge).await {
            Ok(payment) => payment,
            Err(e) => {
                self.set_intent_status(intent, IntentStatus::Rejected, Some(e.to_string()))
                    .await?;
                return Err(e.into());
            }
        };

        let intent = self
            .attach_external_id(intent, &payment.id.to_string())
            .await?;
        let outcome = self
            .handle_confirmation(payment.confirmation_for(BatchOrigin::CardPayment))
            .await?;

        Ok((self.get_intent(intent.id).await?, outcome))
    }

    #[instrument(skip(self, request), fields(package_id = %request.package_id))]
    pub async fn start_pix_mercadopago(
        &self,
        account_id: Uuid,
        request: &PixPaymentRequest,
    ) -> LedgerResult<(payment_intents::Model, PixCharge)> {
        let mercadopago = self.mercadopago()?;
        let payer_email = request.payer_email.as_deref().ok_or_else(|| {
            LedgerError::InvalidPayment("payerEmail is required for Mercado Pago PIX".to_string())
        })?;

        let intent = self
            .create_intent(account_id, BatchOrigin::PixMercadopago, &request.package_id)
            .await?;
        let description = format!("{} credits", intent.credits);

        let payment = match mercadopago
            .create_pix_payment(
                &intent.id.to_string(),
                cents_to_brl(intent.price_cents),
                &description,
                payer_email,
            )
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                self.set_intent_status(intent, IntentStatus::Rejected, Some(e.to_string()))
                    .await?;
                return Err(e.into());
            }
        };

        let intent = self
            .attach_external_id(intent, &payment.id.to_string())
            .await?;
        let charge = payment
            .pix_charge(mercadopago.pix_expiration_seconds())
            .ok_or(LedgerError::Provider(ProviderError::Decode {
                provider: "mercadopago",
                message: "PIX payment without QR code".to_string(),
            }))?;

        Ok((intent, charge))
    }

    #[instrument(skip(self, request), fields(package_id = %request.package_id))]
    pub async fn start_pix_inter(
        &self,
        account_id: Uuid,
        request: &PixPaymentRequest,
    ) -> LedgerResult<(payment_intents::Model, PixCharge)> {
        let inter = self.inter()?;
        let intent = self
            .create_intent(account_id, BatchOrigin::PixInter, &request.package_id)
            .await?;

        // Known before the charge exists, so an early callback still resolves
        let txid = new_txid();
        let intent = self.attach_external_id(intent, &txid).await?;

        let payer = match (&request.payer_cpf, &request.payer_name) {
            (Some(cpf), Some(name)) => Some((cpf.as_str(), name.as_str())),
            _ => None,
        };
        let description = format!("{} credits", intent.credits);

        let cob = match inter
            .create_cob(&txid, cents_to_brl(intent.price_cents), &description, payer)
            .await
        {
            Ok(cob) => cob,
            Err(e) => {
                self.set_intent_status(intent, IntentStatus::Rejected, Some(e.to_string()))
                    .await?;
                return Err(e.into());
            }
        };

        let charge = cob
            .pix_charge(inter.pix_expiration_seconds())
            .ok_or(LedgerError::Provider(ProviderError::Decode {
                provider: "inter",
                message: "charge without pixCopiaECola".to_string(),
            }))?;

        Ok((intent, charge))
    }

    /// Resolve the intent, check the amount and settle.
    ///
    /// Safe to call any number of times for the same payment, from any path.
    #[instrument(skip(self), fields(origin = confirmation.origin.as_str(), external_payment_id = %confirmation.external_payment_id))]
    pub async fn handle_confirmation(
        &self,
        confirmation: PaymentConfirmation,
    ) -> LedgerResult<ConfirmationOutcome> {
        let Some(intent) = self.resolve_intent(&confirmation).await? else {
            warn!("Payment confirmation for unknown intent");
            return Ok(ConfirmationOutcome::UnknownPayment);
        };

        let intent = if intent.external_payment_id.is_none() {
            self.attach_external_id(intent, &confirmation.external_payment_id)
                .await?
        } else {
            intent
        };

        match confirmation.status {
            PaymentStatus::Pending => {
                if intent.status == IntentStatus::Pending {
                    self.set_intent_status(intent, IntentStatus::Pending, confirmation.status_detail)
                        .await?;
                }
                Ok(ConfirmationOutcome::Pending)
            }
            status @ (PaymentStatus::Rejected | PaymentStatus::Cancelled) => {
                if intent.status == IntentStatus::Approved {
                    // Refunds and chargebacks are handled outside the ledger
                    return Ok(ConfirmationOutcome::Ignored(format!(
                        "intent already approved, provider reports {:?}",
                        status
                    )));
                }
                self.set_intent_status(intent, status.as_intent_status(), confirmation.status_detail)
                    .await?;
                Ok(ConfirmationOutcome::Declined(status))
            }
            PaymentStatus::Approved => {
                let expected = cents_to_brl(intent.price_cents);
                if confirmation.amount != expected {
                    warn!(
                        expected = %expected,
                        received = %confirmation.amount,
                        "Paid amount does not match intent price"
                    );
                    if intent.status != IntentStatus::Approved {
                        self.settlement
                            .record_rejection(
                                confirmation.origin,
                                &confirmation.external_payment_id,
                                intent.account_id,
                                intent.credits,
                                &format!(
                                    "amount mismatch: expected {}, received {}",
                                    expected, confirmation.amount
                                ),
                            )
                            .await?;
                        self.set_intent_status(
                            intent,
                            IntentStatus::Rejected,
                            Some("amount_mismatch".to_string()),
                        )
                        .await?;
                    }
                    return Ok(ConfirmationOutcome::AmountMismatch {
                        expected,
                        received: confirmation.amount,
                    });
                }

                let result = self
                    .settlement
                    .settle(
                        confirmation.origin,
                        &confirmation.external_payment_id,
                        intent.account_id,
                        intent.credits,
                        self.purchase_expiry(OffsetDateTime::now_utc()),
                    )
                    .await?;

                if intent.status != IntentStatus::Approved {
                    self.set_intent_status(intent, IntentStatus::Approved, confirmation.status_detail)
                        .await?;
                }

                Ok(ConfirmationOutcome::Settled(result))
            }
        }
    }

    /// Client polling: ask the provider for the current state of an intent
    #[instrument(skip(self))]
    pub async fn sync_intent(
        &self,
        account_id: Uuid,
        intent_id: Uuid,
    ) -> LedgerResult<(payment_intents::Model, ConfirmationOutcome)> {
        let intent = self.get_intent(intent_id).await?;
        if intent.account_id != account_id {
            return Err(LedgerError::IntentNotFound(intent_id.to_string()));
        }

        let Some(external_payment_id) = intent.external_payment_id.clone() else {
            return Ok((intent, ConfirmationOutcome::Pending));
        };

        let confirmation = match intent.origin {
            BatchOrigin::CardPayment | BatchOrigin::PixMercadopago => self
                .mercadopago()?
                .get_payment(&external_payment_id)
                .await?
                .confirmation_for(intent.origin),
            BatchOrigin::PixInter => self
                .inter()?
                .get_cob(&external_payment_id)
                .await?
                .confirmation(),
            other => {
                return Err(LedgerError::InvalidPayment(format!(
                    "{} intents cannot be synced",
                    other.as_str()
                )))
            }
        };

        let outcome = self.handle_confirmation(confirmation).await?;
        Ok((self.get_intent(intent_id).await?, outcome))
    }

    /// Verify and process a Mercado Pago notification
    #[instrument(skip(self, notification, x_signature))]
    pub async fn handle_mercadopago_notification(
        &self,
        x_signature: Option<&str>,
        x_request_id: Option<&str>,
        query_data_id: Option<&str>,
        notification: MercadoPagoNotification,
    ) -> LedgerResult<ConfirmationOutcome> {
        let mercadopago = self.mercadopago()?;
        let data_id = notification
            .payment_id()
            .or_else(|| query_data_id.map(|s| s.to_string()));

        let signature = x_signature
            .ok_or_else(|| LedgerError::InvalidSignature("missing x-signature".to_string()))?;
        if !mercadopago.verify_notification(signature, x_request_id, data_id.as_deref()) {
            return Err(LedgerError::InvalidSignature(
                "x-signature does not match".to_string(),
            ));
        }

        if !notification.is_payment() {
            return Ok(ConfirmationOutcome::Ignored(
                "not a payment notification".to_string(),
            ));
        }
        let Some(payment_id) = data_id else {
            return Ok(ConfirmationOutcome::Ignored("missing payment id".to_string()));
        };

        let payment = mercadopago.get_payment(&payment_id).await?;
        let Some(confirmation) = payment.confirmation() else {
            return Ok(ConfirmationOutcome::Ignored(format!(
                "unsupported payment type {:?}",
                payment.payment_type_id
            )));
        };

        self.handle_confirmation(confirmation).await
    }

    /// Authenticate and process an Inter PIX callback, one outcome per entry
    #[instrument(skip(self, token, callback), fields(entries = callback.pix.len()))]
    pub async fn handle_inter_callback(
        &self,
        token: Option<&str>,
        callback: InterCallback,
    ) -> LedgerResult<Vec<ConfirmationOutcome>> {
        let inter = self.inter()?;
        if !inter.webhook_token_matches(token) {
            return Err(LedgerError::InvalidSignature(
                "invalid callback token".to_string(),
            ));
        }

        let mut outcomes = Vec::with_capacity(callback.pix.len());
        for entry in callback.pix {
            let Some(txid) = entry.txid.clone() else {
                outcomes.push(ConfirmationOutcome::Ignored(format!(
                    "PIX {} without txid",
                    entry.end_to_end_id
                )));
                continue;
            };

            let confirmation = if inter.confirms_callbacks() {
                inter.get_cob(&txid).await?.confirmation()
            } else {
                match entry.confirmation() {
                    Some(confirmation) => confirmation,
                    None => continue,
                }
            };

            outcomes.push(self.handle_confirmation(confirmation).await?);
        }

        Ok(outcomes)
    }

    async fn resolve_intent(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> LedgerResult<Option<payment_intents::Model>> {
        if let Some(intent_id) = confirmation
            .reference
            .as_deref()
            .and_then(|r| Uuid::parse_str(r).ok())
        {
            if let Some(intent) = payment_intents::Entity::find_by_id(intent_id)
                .one(&self.db)
                .await?
            {
                if intent.origin == confirmation.origin {
                    return Ok(Some(intent));
                }
                warn!(
                    intent_id = %intent_id,
                    intent_origin = intent.origin.as_str(),
                    "Payment reference points at an intent on another rail"
                );
            }
        }

        Ok(payment_intents::Entity::find()
            .filter(payment_intents::Column::Origin.eq(confirmation.origin))
            .filter(
                payment_intents::Column::ExternalPaymentId.eq(confirmation.external_payment_id.as_str()),
            )
            .one(&self.db)
            .await?)
    }

    async fn attach_external_id(
        &self,
        intent: payment_intents::Model,
        external_payment_id: &str,
    ) -> LedgerResult<payment_intents::Model> {
        let mut active: payment_intents::ActiveModel = intent.into();
        active.external_payment_id = Set(Some(external_payment_id.to_string()));
        active.updated_at = Set(OffsetDateTime::now_utc());
        Ok(active.update(&self.db).await?)
    }

    async fn set_intent_status(
        &self,
        intent: payment_intents::Model,
        status: IntentStatus,
        detail: Option<String>,
    ) -> LedgerResult<payment_intents::Model> {
        let mut active: payment_intents::ActiveModel = intent.into();
        active.status = Set(status);
        if detail.is_some() {
            active.status_detail = Set(detail);
        }
        active.updated_at = Set(OffsetDateTime::now_utc());
        Ok(active.update(&self.db).await?)
    }
}
