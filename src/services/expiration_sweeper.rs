//! Retirement of expired credit batches.
//!
//! The balance query already ignores batches past their expiry, so sweeping
//! never changes what an account can spend. It turns the implicit expiry into
//! recorded state (`status = expired`, capacity fully consumed) and reports how
//! much was forfeited.

use std::time::Duration;

use crate::{
    error::LedgerResult,
    models::credit_batch_ext::CreditBatchExt,
    services::ledger_service::lock_account,
};
use entity::{credit_batches, sea_orm_active_enums::BatchStatus};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, Select, TransactionTrait};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub accounts_affected: u64,
    pub credits_expired: i64,
}

/// Active batches past their expiry at `now` that still hold capacity
fn lapsed_batches(now: OffsetDateTime) -> Select<credit_batches::Entity> {
    credit_batches::Entity::find()
        .filter(credit_batches::Column::Status.eq(BatchStatus::Active))
        .filter(credit_batches::Column::ExpiresAt.lte(now))
        .filter(
            Expr::col(credit_batches::Column::AmountConsumed)
                .lt(Expr::col(credit_batches::Column::AmountAdded)),
        )
}

#[derive(Clone)]
pub struct ExpirationSweeper {
    db: DatabaseConnection,
}

impl ExpirationSweeper {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Expire every active batch with `expires_at <= now` and capacity left.
    ///
    /// Each account is swept in its own transaction under the account lock,
    /// so a sweep never interleaves with a debit on the same account.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: OffsetDateTime) -> LedgerResult<SweepReport> {
        let accounts: Vec<Uuid> = lapsed_batches(now)
            .select_only()
            .column(credit_batches::Column::AccountId)
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut report = SweepReport::default();
        for account_id in accounts {
            let expired = self.sweep_account(account_id, now).await?;
            if expired > 0 {
                report.accounts_affected += 1;
                report.credits_expired += expired;
            }
        }

        info!(
            accounts_affected = report.accounts_affected,
            credits_expired = report.credits_expired,
            "Expiration sweep finished"
        );

        Ok(report)
    }

    async fn sweep_account(&self, account_id: Uuid, now: OffsetDateTime) -> LedgerResult<i64> {
        let txn = self.db.begin().await?;
        lock_account(&txn, account_id).await?;

        // Re-read under the lock; a debit may have drained a candidate since
        let batches = lapsed_batches(now)
            .filter(credit_batches::Column::AccountId.eq(account_id))
            .all(&txn)
            .await?;

        let mut expired = 0;
        for batch in batches {
            if !batch.is_expired_at(now) || batch.remaining() == 0 {
                continue;
            }
            expired += batch.remaining();

            let added = batch.amount_added;
            let mut active: credit_batches::ActiveModel = batch.into();
            active.amount_consumed = Set(added);
            active.status = Set(BatchStatus::Expired);
            active.updated_at = Set(OffsetDateTime::now_utc());
            active.update(&txn).await?;
        }

        txn.commit().await?;

        if expired > 0 {
            info!(account_id = %account_id, credits_expired = expired, "Expired credits");
        }

        Ok(expired)
    }

    /// Run the sweep on a fixed interval in the background.
    ///
    /// The first tick fires immediately. Returns a handle that can be used to abort the task.
    pub fn spawn_schedule(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if let Err(e) = self.sweep(OffsetDateTime::now_utc()).await {
                    warn!(error = %e, retryable = e.is_retryable(), "Scheduled expiration sweep failed");
                }
            }
        })
    }
}
