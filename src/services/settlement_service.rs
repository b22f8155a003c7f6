use crate::{
    error::{LedgerError, LedgerResult},
    services::ledger_service::LedgerService,
};
use entity::{
    credit_batches, settlement_records,
    sea_orm_active_enums::{BatchOrigin, SettlementOutcome},
};
use sea_orm::{
    entity::*, query::*, sea_query::{Expr, OnConflict}, DatabaseConnection,
    DatabaseTransaction, TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum SettleResult {
    /// First confirmation of this payment: exactly one batch was created
    Credited {
        batch: credit_batches::Model,
        record_id: Uuid,
    },
    /// The payment was already credited; nothing changed but the duplicate counter
    DuplicateIgnored { record: settlement_records::Model },
}

impl SettleResult {
    pub fn outcome(&self) -> &'static str {
        match self {
            SettleResult::Credited { .. } => "credited",
            SettleResult::DuplicateIgnored { .. } => "duplicate_ignored",
        }
    }
}

/// Single entry point turning provider confirmations into credits.
///
/// Keyed by `(origin, external_payment_id)`; the unique index on the
/// settlement table is what makes concurrent confirmations collapse.
pub struct SettlementService {
    db: DatabaseConnection,
    ledger: LedgerService,
}

impl SettlementService {
    pub fn new(db: DatabaseConnection) -> Self {
        let ledger = LedgerService::new(db.clone());
        Self { db, ledger }
    }

    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        origin: BatchOrigin,
        external_payment_id: &str,
        account_id: Uuid,
        amount: i64,
        expires_at: Option<OffsetDateTime>,
    ) -> LedgerResult<SettleResult> {
        if external_payment_id.trim().is_empty() {
            return Err(LedgerError::InvalidPayment(
                "external payment id is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();
        let record_id = Uuid::now_v7();

        let record = settlement_records::ActiveModel {
            id: Set(record_id),
            origin: Set(origin),
            external_payment_id: Set(external_payment_id.to_string()),
            account_id: Set(account_id),
            amount: Set(amount),
            batch_id: Set(None),
            outcome: Set(SettlementOutcome::Credited),
            rejection_reason: Set(None),
            duplicate_count: Set(0),
            last_duplicate_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // Insert atomically; if the key already exists, do nothing instead of erroring
        let inserted = settlement_records::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    settlement_records::Column::Origin,
                    settlement_records::Column::ExternalPaymentId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        let record_id = if inserted == 1 {
            record_id
        } else {
            let existing = Self::find_in_txn(&txn, origin, external_payment_id).await?;
            let claimed = existing.outcome == SettlementOutcome::Rejected
                && Self::claim_rejected(&txn, existing.id, account_id, amount, now).await?;

            if !claimed {
                let record = Self::mark_duplicate(&txn, existing.id, now).await?;
                txn.commit().await?;

                info!(
                    origin = origin.as_str(),
                    external_payment_id,
                    duplicate_count = record.duplicate_count,
                    "Duplicate payment confirmation ignored"
                );
                return Ok(SettleResult::DuplicateIgnored { record });
            }

            info!(
                origin = origin.as_str(),
                external_payment_id, "Retrying previously rejected settlement"
            );
            existing.id
        };

        let batch = match self
            .ledger
            .credit_in_txn(
                &txn,
                account_id,
                amount,
                origin,
                Some(external_payment_id),
                expires_at,
            )
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                txn.rollback().await?;
                if let Err(record_err) = self
                    .record_rejection(origin, external_payment_id, account_id, amount, &e.to_string())
                    .await
                {
                    warn!(
                        error = %record_err,
                        "Failed to record rejected settlement"
                    );
                }
                return Err(e);
            }
        };

        settlement_records::Entity::update_many()
            .col_expr(settlement_records::Column::BatchId, Expr::value(Some(batch.id)))
            .col_expr(settlement_records::Column::UpdatedAt, Expr::value(now))
            .filter(settlement_records::Column::Id.eq(record_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(
            origin = origin.as_str(),
            external_payment_id,
            account_id = %account_id,
            batch_id = %batch.id,
            amount,
            "Payment settled"
        );

        Ok(SettleResult::Credited { batch, record_id })
    }

    /// Record a settlement that could not be credited, keeping it retryable.
    ///
    /// Never downgrades a `credited` record.
    #[instrument(skip(self))]
    pub async fn record_rejection(
        &self,
        origin: BatchOrigin,
        external_payment_id: &str,
        account_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> LedgerResult<settlement_records::Model> {
        let txn = self.db.begin().await?;
        let now = OffsetDateTime::now_utc();

        let record = settlement_records::ActiveModel {
            id: Set(Uuid::now_v7()),
            origin: Set(origin),
            external_payment_id: Set(external_payment_id.to_string()),
            account_id: Set(account_id),
            amount: Set(amount),
            batch_id: Set(None),
            outcome: Set(SettlementOutcome::Rejected),
            rejection_reason: Set(Some(reason.to_string())),
            duplicate_count: Set(0),
            last_duplicate_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = settlement_records::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    settlement_records::Column::Origin,
                    settlement_records::Column::ExternalPaymentId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            settlement_records::Entity::update_many()
                .col_expr(
                    settlement_records::Column::RejectionReason,
                    Expr::value(Some(reason.to_string())),
                )
                .col_expr(settlement_records::Column::UpdatedAt, Expr::value(now))
                .filter(settlement_records::Column::Origin.eq(origin))
                .filter(settlement_records::Column::ExternalPaymentId.eq(external_payment_id))
                .filter(settlement_records::Column::Outcome.eq(SettlementOutcome::Rejected))
                .exec(&txn)
                .await?;
        }

        let record = Self::find_in_txn(&txn, origin, external_payment_id).await?;
        txn.commit().await?;

        warn!(
            origin = origin.as_str(),
            external_payment_id,
            reason,
            "Settlement rejected"
        );

        Ok(record)
    }

    pub async fn find_record(
        &self,
        origin: BatchOrigin,
        external_payment_id: &str,
    ) -> LedgerResult<Option<settlement_records::Model>> {
        Ok(settlement_records::Entity::find()
            .filter(settlement_records::Column::Origin.eq(origin))
            .filter(settlement_records::Column::ExternalPaymentId.eq(external_payment_id))
            .one(&self.db)
            .await?)
    }

    async fn find_in_txn(
        txn: &DatabaseTransaction,
        origin: BatchOrigin,
        external_payment_id: &str,
    ) -> LedgerResult<settlement_records::Model> {
        settlement_records::Entity::find()
            .filter(settlement_records::Column::Origin.eq(origin))
            .filter(settlement_records::Column::ExternalPaymentId.eq(external_payment_id))
            .one(txn)
            .await?
            .ok_or_else(|| {
                LedgerError::StorageConflict(format!(
                    "settlement record {}:{} vanished after conflict",
                    origin.as_str(),
                    external_payment_id
                ))
            })
    }

    /// Take over a rejected record for a retry; false if another caller got it first
    async fn claim_rejected(
        txn: &DatabaseTransaction,
        record_id: Uuid,
        account_id: Uuid,
        amount: i64,
        now: OffsetDateTime,
    ) -> LedgerResult<bool> {
        let result = settlement_records::Entity::update_many()
            .col_expr(
                settlement_records::Column::Outcome,
                Expr::value(SettlementOutcome::Credited),
            )
            .col_expr(
                settlement_records::Column::RejectionReason,
                Expr::value(Option::<String>::None),
            )
            .col_expr(settlement_records::Column::AccountId, Expr::value(account_id))
            .col_expr(settlement_records::Column::Amount, Expr::value(amount))
            .col_expr(settlement_records::Column::UpdatedAt, Expr::value(now))
            .filter(settlement_records::Column::Id.eq(record_id))
            .filter(settlement_records::Column::Outcome.eq(SettlementOutcome::Rejected))
            .exec(txn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_duplicate(
        txn: &DatabaseTransaction,
        record_id: Uuid,
        now: OffsetDateTime,
    ) -> LedgerResult<settlement_records::Model> {
        settlement_records::Entity::update_many()
            .col_expr(
                settlement_records::Column::DuplicateCount,
                Expr::col(settlement_records::Column::DuplicateCount).add(1),
            )
            .col_expr(
                settlement_records::Column::LastDuplicateAt,
                Expr::value(Some(now)),
            )
            .filter(settlement_records::Column::Id.eq(record_id))
            .exec(txn)
            .await?;

        settlement_records::Entity::find_by_id(record_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                LedgerError::StorageConflict(format!("settlement record {} vanished", record_id))
            })
    }
}
