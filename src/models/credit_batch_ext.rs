/// Extension methods for the credit_batches entity
///
/// Business predicates that complement the generated model in
/// entity/src/credit_batches.rs
use entity::{credit_batches, sea_orm_active_enums::BatchStatus};
use time::OffsetDateTime;

/// Extension trait for CreditBatch model
pub trait CreditBatchExt {
    /// Remaining capacity (added - consumed), never negative
    fn remaining(&self) -> i64;

    /// Past its expiry at `now`, regardless of status
    fn is_expired_at(&self, now: OffsetDateTime) -> bool;

    /// Counts toward the available balance at `now`
    fn is_available_at(&self, now: OffsetDateTime) -> bool;
}

impl CreditBatchExt for credit_batches::Model {
    fn remaining(&self) -> i64 {
        (self.amount_added - self.amount_consumed).max(0)
    }

    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    fn is_available_at(&self, now: OffsetDateTime) -> bool {
        self.status == BatchStatus::Active && !self.is_expired_at(now)
    }
}
