use crate::{
    error::{LedgerError, LedgerResult},
    models::credit_batch_ext::CreditBatchExt,
};
use entity::{
    accounts, credit_batches, debit_allocations, debit_transactions,
    sea_orm_active_enums::{BatchOrigin, BatchStatus, DebitStatus},
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, TransactionTrait,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Credits taken from one batch by one debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub batch_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitResult {
    /// `None` for a zero-amount debit, which touches nothing
    pub debit_id: Option<Uuid>,
    pub account_id: Uuid,
    pub amount: i64,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReversalOutcome {
    /// `forfeited` counts allocations whose batch expired or was voided since the debit
    Reversed { restored: i64, forfeited: i64 },
    AlreadyReversed,
    /// The debit never consumed anything (insufficient funds)
    NothingToReverse,
}

/// A debit transaction together with its per-batch breakdown
#[derive(Debug, Clone)]
pub struct DebitView {
    pub debit: debit_transactions::Model,
    pub allocations: Vec<Allocation>,
}

#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub account_id: Uuid,
    pub available: i64,
    /// Batches counted in `available`, in consumption order
    pub batches: Vec<credit_batches::Model>,
    pub as_of: OffsetDateTime,
}

/// Order in which a debit drains batches: soonest expiry first, never-expiring
/// last, then oldest, then id.
fn consumption_key(batch: &credit_batches::Model) -> (bool, Option<OffsetDateTime>, OffsetDateTime, Uuid) {
    (
        batch.expires_at.is_none(),
        batch.expires_at,
        batch.created_at,
        batch.id,
    )
}

/// Plan how `amount` is taken from `batches` at `now`.
///
/// Returns the available balance as the error when it does not cover `amount`.
pub fn plan_consumption(
    batches: &[credit_batches::Model],
    amount: i64,
    now: OffsetDateTime,
) -> std::result::Result<Vec<Allocation>, i64> {
    let mut usable: Vec<&credit_batches::Model> = batches
        .iter()
        .filter(|b| b.is_available_at(now) && b.remaining() > 0)
        .collect();
    usable.sort_by_key(|b| consumption_key(b));

    let available: i64 = usable.iter().map(|b| b.remaining()).sum();
    if available < amount {
        return Err(available);
    }

    let mut allocations = Vec::new();
    let mut outstanding = amount;
    for batch in usable {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(batch.remaining());
        allocations.push(Allocation {
            batch_id: batch.id,
            amount: take,
        });
        outstanding -= take;
    }

    Ok(allocations)
}

/// Balance over batches already loaded for one account
pub fn available_balance(batches: &[credit_batches::Model], now: OffsetDateTime) -> i64 {
    batches
        .iter()
        .filter(|b| b.is_available_at(now))
        .map(|b| b.remaining())
        .sum()
}

/// Lock the account row for the rest of the transaction.
///
/// Every mutation of an account's batches goes through here first, so
/// operations on one account are linearized while other accounts proceed.
pub(crate) async fn lock_account(
    txn: &DatabaseTransaction,
    account_id: Uuid,
) -> LedgerResult<accounts::Model> {
    if txn.get_database_backend() == DbBackend::Sqlite {
        // SQLite ignores FOR UPDATE; a no-op write takes the database write lock
        accounts::Entity::update_many()
            .col_expr(
                accounts::Column::UpdatedAt,
                Expr::col(accounts::Column::UpdatedAt).into(),
            )
            .filter(accounts::Column::Id.eq(account_id))
            .exec(txn)
            .await?;
    }

    accounts::Entity::find_by_id(account_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
}

/// Active batches of one account that still have capacity. Drained batches
/// stay `active` but are left out, so the read does not grow with history.
pub(crate) async fn active_batches<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
) -> LedgerResult<Vec<credit_batches::Model>> {
    Ok(credit_batches::Entity::find()
        .filter(credit_batches::Column::AccountId.eq(account_id))
        .filter(credit_batches::Column::Status.eq(BatchStatus::Active))
        .filter(
            Expr::col(credit_batches::Column::AmountConsumed)
                .lt(Expr::col(credit_batches::Column::AmountAdded)),
        )
        .all(conn)
        .await?)
}

#[derive(Clone)]
pub struct LedgerService {
    db: DatabaseConnection,
}

impl LedgerService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_balance(&self, account_id: Uuid) -> LedgerResult<i64> {
        self.get_balance_at(account_id, OffsetDateTime::now_utc())
            .await
    }

    /// Sum of remaining capacity over active batches not expired at `now`.
    /// One read, no side effects.
    #[instrument(skip(self))]
    pub async fn get_balance_at(&self, account_id: Uuid, now: OffsetDateTime) -> LedgerResult<i64> {
        let batches = active_batches(&self.db, account_id).await?;
        Ok(available_balance(&batches, now))
    }

    /// Balance plus the batches that make it up
    #[instrument(skip(self))]
    pub async fn balance_snapshot(&self, account_id: Uuid) -> LedgerResult<BalanceSnapshot> {
        let now = OffsetDateTime::now_utc();
        let mut batches: Vec<credit_batches::Model> = active_batches(&self.db, account_id)
            .await?
            .into_iter()
            .filter(|b| b.is_available_at(now) && b.remaining() > 0)
            .collect();
        batches.sort_by_key(consumption_key);

        Ok(BalanceSnapshot {
            account_id,
            available: available_balance(&batches, now),
            batches,
            as_of: now,
        })
    }

    /// Append one batch. Uniqueness of `external_payment_id` is the settlement
    /// gateway's concern, not checked here.
    #[instrument(skip(self))]
    pub async fn credit(
        &self,
        account_id: Uuid,
        amount: i64,
        origin: BatchOrigin,
        external_payment_id: Option<&str>,
        expires_at: Option<OffsetDateTime>,
    ) -> LedgerResult<credit_batches::Model> {
        let txn = self.db.begin().await?;
        let batch = self
            .credit_in_txn(&txn, account_id, amount, origin, external_payment_id, expires_at)
            .await?;
        txn.commit().await?;
        Ok(batch)
    }

    /// Append one batch within an existing transaction
    #[instrument(skip(self, txn))]
    pub async fn credit_in_txn(
        &self,
        txn: &DatabaseTransaction,
        account_id: Uuid,
        amount: i64,
        origin: BatchOrigin,
        external_payment_id: Option<&str>,
        expires_at: Option<OffsetDateTime>,
    ) -> LedgerResult<credit_batches::Model> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }

        lock_account(txn, account_id).await?;

        let now = OffsetDateTime::now_utc();
        let batch = credit_batches::ActiveModel {
            id: Set(Uuid::now_v7()),
            account_id: Set(account_id),
            amount_added: Set(amount),
            amount_consumed: Set(0),
            origin: Set(origin),
            external_payment_id: Set(external_payment_id.map(|s| s.to_string())),
            status: Set(BatchStatus::Active),
            void_reason: Set(None),
            created_at: Set(now),
            expires_at: Set(expires_at),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        info!(
            account_id = %account_id,
            batch_id = %batch.id,
            amount,
            origin = origin.as_str(),
            "Credited batch"
        );

        Ok(batch)
    }

    /// Raw debit, committed immediately
    pub async fn debit(&self, account_id: Uuid, amount: i64) -> LedgerResult<DebitResult> {
        self.debit_with(account_id, amount, None, DebitStatus::Committed)
            .await
    }

    /// Debit reserved for an order. Stays `pending` until finalized or
    /// reversed; a shortfall is recorded as an `insufficient_funds` debit.
    pub async fn debit_for_order(
        &self,
        account_id: Uuid,
        amount: i64,
        order_ref: &str,
    ) -> LedgerResult<DebitResult> {
        self.debit_with(account_id, amount, Some(order_ref), DebitStatus::Pending)
            .await
    }

    #[instrument(skip(self))]
    async fn debit_with(
        &self,
        account_id: Uuid,
        amount: i64,
        order_ref: Option<&str>,
        status: DebitStatus,
    ) -> LedgerResult<DebitResult> {
        if amount < 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        if amount == 0 {
            return Ok(DebitResult {
                debit_id: None,
                account_id,
                amount: 0,
                allocations: Vec::new(),
            });
        }

        let txn = self.db.begin().await?;
        lock_account(&txn, account_id).await?;

        let now = OffsetDateTime::now_utc();
        let batches = active_batches(&txn, account_id).await?;

        let allocations = match plan_consumption(&batches, amount, now) {
            Ok(allocations) => allocations,
            Err(available) => {
                if order_ref.is_some() {
                    self.insert_debit(&txn, account_id, order_ref, amount, DebitStatus::InsufficientFunds, now)
                        .await?;
                    txn.commit().await?;
                } else {
                    txn.rollback().await?;
                }
                info!(
                    account_id = %account_id,
                    requested = amount,
                    available,
                    "Debit refused: insufficient credits"
                );
                return Err(LedgerError::InsufficientCredits {
                    available,
                    requested: amount,
                });
            }
        };

        for allocation in &allocations {
            // The plan only names batches loaded above
            let Some(batch) = batches.iter().find(|b| b.id == allocation.batch_id) else {
                txn.rollback().await?;
                return Err(LedgerError::BatchNotFound(allocation.batch_id));
            };
            let mut active: credit_batches::ActiveModel = batch.clone().into();
            active.amount_consumed = Set(batch.amount_consumed + allocation.amount);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let debit = self
            .insert_debit(&txn, account_id, order_ref, amount, status, now)
            .await?;

        for (position, allocation) in allocations.iter().enumerate() {
            debit_allocations::ActiveModel {
                id: Set(Uuid::now_v7()),
                debit_id: Set(debit.id),
                batch_id: Set(allocation.batch_id),
                amount: Set(allocation.amount),
                position: Set(position as i32),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(
            account_id = %account_id,
            debit_id = %debit.id,
            amount,
            batches = allocations.len(),
            "Debited credits"
        );

        Ok(DebitResult {
            debit_id: Some(debit.id),
            account_id,
            amount,
            allocations,
        })
    }

    async fn insert_debit(
        &self,
        txn: &DatabaseTransaction,
        account_id: Uuid,
        order_ref: Option<&str>,
        amount: i64,
        status: DebitStatus,
        now: OffsetDateTime,
    ) -> LedgerResult<debit_transactions::Model> {
        let failure_reason = (status == DebitStatus::InsufficientFunds)
            .then(|| "insufficient credits".to_string());

        Ok(debit_transactions::ActiveModel {
            id: Set(Uuid::now_v7()),
            account_id: Set(account_id),
            order_ref: Set(order_ref.map(|s| s.to_string())),
            amount: Set(amount),
            status: Set(status),
            failure_reason: Set(failure_reason),
            created_at: Set(now),
            updated_at: Set(now),
            reversed_at: Set(None),
        }
        .insert(txn)
        .await?)
    }

    /// Restore a debit's allocations to the batches they came from.
    ///
    /// Repeating a reversal restores nothing and reports `AlreadyReversed`.
    #[instrument(skip(self))]
    pub async fn reverse(
        &self,
        debit_id: Uuid,
        reason: Option<&str>,
    ) -> LedgerResult<ReversalOutcome> {
        let txn = self.db.begin().await?;

        let account_id = debit_transactions::Entity::find_by_id(debit_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::DebitNotFound(debit_id))?
            .account_id;

        lock_account(&txn, account_id).await?;

        // Re-read under the account lock so a concurrent reversal is observed
        let debit = debit_transactions::Entity::find_by_id(debit_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::DebitNotFound(debit_id))?;

        match debit.status {
            DebitStatus::Reversed => {
                txn.rollback().await?;
                info!(debit_id = %debit_id, "Debit already reversed");
                return Ok(ReversalOutcome::AlreadyReversed);
            }
            DebitStatus::InsufficientFunds => {
                txn.rollback().await?;
                return Ok(ReversalOutcome::NothingToReverse);
            }
            DebitStatus::Pending | DebitStatus::Committed => {}
        }

        let allocations = debit_allocations::Entity::find()
            .filter(debit_allocations::Column::DebitId.eq(debit_id))
            .order_by_asc(debit_allocations::Column::Position)
            .all(&txn)
            .await?;

        let now = OffsetDateTime::now_utc();
        let mut restored = 0;
        let mut forfeited = 0;

        for allocation in allocations {
            let batch = credit_batches::Entity::find_by_id(allocation.batch_id)
                .one(&txn)
                .await?
                .ok_or(LedgerError::BatchNotFound(allocation.batch_id))?;

            if !batch.is_available_at(now) {
                forfeited += allocation.amount;
                continue;
            }

            let consumed = (batch.amount_consumed - allocation.amount).max(0);
            let mut active: credit_batches::ActiveModel = batch.into();
            active.amount_consumed = Set(consumed);
            active.updated_at = Set(now);
            active.update(&txn).await?;
            restored += allocation.amount;
        }

        let mut active: debit_transactions::ActiveModel = debit.into();
        active.status = Set(DebitStatus::Reversed);
        active.failure_reason = Set(reason.map(|s| s.to_string()));
        active.reversed_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        txn.commit().await?;

        if forfeited > 0 {
            warn!(
                debit_id = %debit_id,
                forfeited,
                "Reversal skipped retired batches"
            );
        }
        info!(debit_id = %debit_id, restored, "Reversed debit");

        Ok(ReversalOutcome::Reversed {
            restored,
            forfeited,
        })
    }

    /// Mark a pending debit committed. Committing twice is a no-op.
    #[instrument(skip(self))]
    pub async fn finalize(&self, debit_id: Uuid) -> LedgerResult<debit_transactions::Model> {
        let now = OffsetDateTime::now_utc();

        debit_transactions::Entity::update_many()
            .col_expr(
                debit_transactions::Column::Status,
                Expr::value(DebitStatus::Committed),
            )
            .col_expr(debit_transactions::Column::UpdatedAt, Expr::value(now))
            .filter(debit_transactions::Column::Id.eq(debit_id))
            .filter(debit_transactions::Column::Status.eq(DebitStatus::Pending))
            .exec(&self.db)
            .await?;

        let debit = debit_transactions::Entity::find_by_id(debit_id)
            .one(&self.db)
            .await?
            .ok_or(LedgerError::DebitNotFound(debit_id))?;

        if debit.status != DebitStatus::Committed {
            return Err(LedgerError::InvalidOrder(format!(
                "debit {} cannot be committed from status {:?}",
                debit_id, debit.status
            )));
        }

        Ok(debit)
    }

    /// Administrative correction: retire a batch without expiring it
    #[instrument(skip(self))]
    pub async fn void_batch(
        &self,
        batch_id: Uuid,
        reason: &str,
    ) -> LedgerResult<credit_batches::Model> {
        let txn = self.db.begin().await?;

        let account_id = credit_batches::Entity::find_by_id(batch_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::BatchNotFound(batch_id))?
            .account_id;

        lock_account(&txn, account_id).await?;

        let batch = credit_batches::Entity::find_by_id(batch_id)
            .one(&txn)
            .await?
            .ok_or(LedgerError::BatchNotFound(batch_id))?;

        if batch.status == BatchStatus::Void {
            txn.rollback().await?;
            return Ok(batch);
        }

        let forfeited = batch.remaining();
        let mut active: credit_batches::ActiveModel = batch.into();
        active.status = Set(BatchStatus::Void);
        active.void_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(OffsetDateTime::now_utc());
        let batch = active.update(&txn).await?;

        txn.commit().await?;

        info!(batch_id = %batch_id, forfeited, reason, "Voided batch");

        Ok(batch)
    }

    /// Every batch of the account, oldest first
    pub async fn list_batches(&self, account_id: Uuid) -> LedgerResult<Vec<credit_batches::Model>> {
        Ok(credit_batches::Entity::find()
            .filter(credit_batches::Column::AccountId.eq(account_id))
            .order_by_asc(credit_batches::Column::CreatedAt)
            .order_by_asc(credit_batches::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_debit(&self, debit_id: Uuid) -> LedgerResult<DebitView> {
        let debit = debit_transactions::Entity::find_by_id(debit_id)
            .one(&self.db)
            .await?
            .ok_or(LedgerError::DebitNotFound(debit_id))?;

        let allocations = debit_allocations::Entity::find()
            .filter(debit_allocations::Column::DebitId.eq(debit_id))
            .order_by_asc(debit_allocations::Column::Position)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|a| Allocation {
                batch_id: a.batch_id,
                amount: a.amount,
            })
            .collect();

        Ok(DebitView { debit, allocations })
    }
}
