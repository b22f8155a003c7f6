use entity::{
    accounts, debit_transactions, settlement_records,
    sea_orm_active_enums::{BatchOrigin, DebitStatus, SettlementOutcome},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{common::SuccessResponse, credits::BatchView};
use crate::services::{
    expiration_sweeper::SweepReport,
    ledger_service::{Allocation, DebitView, ReversalOutcome},
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    /// Identifier of the user in the marketplace
    #[validate(length(min = 1, max = 255))]
    pub external_ref: String,

    #[validate(length(max = 200))]
    pub display_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub account_id: Uuid,
    pub external_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// False when the account already existed
    pub created: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AccountData {
    pub fn new(account: accounts::Model, created: bool) -> Self {
        Self {
            account_id: account.id,
            external_ref: account.external_ref,
            display_name: account.display_name,
            email: account.email,
            created,
            created_at: account.created_at,
        }
    }
}

pub type AccountResponse = SuccessResponse<AccountData>;

fn validate_grant_origin(origin: &BatchOrigin) -> Result<(), ValidationError> {
    if origin.is_payment_rail() {
        return Err(ValidationError::new("payment_origin_not_grantable"));
    }
    Ok(())
}

/// Operator credit grant
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub account_id: Uuid,

    #[validate(range(min = 1))]
    pub amount: i64,

    /// `admin-grant` or `promotional`
    #[validate(custom(function = "validate_grant_origin"))]
    pub origin: BatchOrigin,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,

    /// Alternative to `expiresAt`, counted from now
    #[validate(range(min = 1, max = 3650))]
    pub expires_in_days: Option<u32>,
}

impl GrantRequest {
    pub fn resolve_expiry(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.expires_at.or_else(|| {
            self.expires_in_days
                .map(|days| now + time::Duration::days(i64::from(days)))
        })
    }
}

pub type BatchResponse = SuccessResponse<BatchView>;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoidRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitData {
    pub debit_id: Uuid,
    pub account_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_ref: Option<String>,
    pub amount: i64,
    pub status: DebitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub allocations: Vec<Allocation>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reversed_at: Option<OffsetDateTime>,
}

impl From<DebitView> for DebitData {
    fn from(view: DebitView) -> Self {
        let debit: debit_transactions::Model = view.debit;
        Self {
            debit_id: debit.id,
            account_id: debit.account_id,
            order_ref: debit.order_ref,
            amount: debit.amount,
            status: debit.status,
            failure_reason: debit.failure_reason,
            allocations: view.allocations,
            created_at: debit.created_at,
            reversed_at: debit.reversed_at,
        }
    }
}

pub type DebitResponse = SuccessResponse<DebitData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReversalData {
    pub debit_id: Uuid,
    pub reversal: ReversalOutcome,
}

pub type ReversalResponse = SuccessResponse<ReversalData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecordData {
    pub record_id: Uuid,
    pub origin: BatchOrigin,
    pub external_payment_id: String,
    pub account_id: Uuid,
    pub amount: i64,
    pub outcome: SettlementOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub duplicate_count: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_duplicate_at: Option<OffsetDateTime>,
}

impl From<settlement_records::Model> for SettlementRecordData {
    fn from(record: settlement_records::Model) -> Self {
        Self {
            record_id: record.id,
            origin: record.origin,
            external_payment_id: record.external_payment_id,
            account_id: record.account_id,
            amount: record.amount,
            outcome: record.outcome,
            batch_id: record.batch_id,
            rejection_reason: record.rejection_reason,
            duplicate_count: record.duplicate_count,
            last_duplicate_at: record.last_duplicate_at,
        }
    }
}

pub type SettlementRecordResponse = SuccessResponse<SettlementRecordData>;

pub type SweepResponse = SuccessResponse<SweepReport>;
