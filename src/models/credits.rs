use entity::{
    credit_batches,
    sea_orm_active_enums::{BatchOrigin, BatchStatus},
};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{common::SuccessResponse, credit_batch_ext::CreditBatchExt};
use crate::services::ledger_service::BalanceSnapshot;

/// One credit batch as shown to its owner and to operators
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub batch_id: Uuid,
    pub origin: BatchOrigin,
    pub status: BatchStatus,
    pub amount_added: i64,
    pub amount_consumed: i64,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Absent for credits that never expire
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl From<credit_batches::Model> for BatchView {
    fn from(batch: credit_batches::Model) -> Self {
        Self {
            batch_id: batch.id,
            remaining: batch.remaining(),
            origin: batch.origin,
            status: batch.status,
            amount_added: batch.amount_added,
            amount_consumed: batch.amount_consumed,
            external_payment_id: batch.external_payment_id,
            void_reason: batch.void_reason,
            created_at: batch.created_at,
            expires_at: batch.expires_at,
        }
    }
}

pub type BalanceResponse = SuccessResponse<BalanceData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    pub account_id: Uuid,
    pub available: i64,
    /// Batches counted in `available`, soonest to expire first
    pub batches: Vec<BatchView>,
    #[serde(with = "time::serde::rfc3339")]
    pub as_of: OffsetDateTime,
}

impl From<BalanceSnapshot> for BalanceData {
    fn from(snapshot: BalanceSnapshot) -> Self {
        Self {
            account_id: snapshot.account_id,
            available: snapshot.available,
            batches: snapshot.batches.into_iter().map(BatchView::from).collect(),
            as_of: snapshot.as_of,
        }
    }
}

pub type BatchListResponse = SuccessResponse<Vec<BatchView>>;
