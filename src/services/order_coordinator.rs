//! Debit-then-act sequencing for orders.
//!
//! Credits are reserved before the irreversible external action and handed
//! back when the action fails or times out. The sequence runs on its own task
//! so a caller that stops waiting cannot leave a debit between phases.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{LedgerError, LedgerResult},
    services::ledger_service::{DebitResult, LedgerService, ReversalOutcome},
};

const MAX_LEDGER_RETRIES: usize = 5;

#[derive(Debug)]
pub enum OrderResult<T> {
    Completed {
        debit: DebitResult,
        output: T,
    },
    /// The action was never invoked
    InsufficientCredits { available: i64, requested: i64 },
    /// The action failed or timed out; the debit has already been reversed
    Failed {
        reason: String,
        debit_id: Option<Uuid>,
        reversal: Option<ReversalOutcome>,
    },
}

#[derive(Clone)]
pub struct OrderCoordinator {
    ledger: LedgerService,
    action_timeout: Duration,
}

impl OrderCoordinator {
    pub fn new(ledger: LedgerService, action_timeout: Duration) -> Self {
        Self {
            ledger,
            action_timeout,
        }
    }

    /// Debit `cost`, run `action`, then commit or reverse the debit.
    #[instrument(skip(self, action))]
    pub async fn reserve_and_execute<T, F, Fut>(
        &self,
        account_id: Uuid,
        order_ref: &str,
        cost: i64,
        action: F,
    ) -> LedgerResult<OrderResult<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let coordinator = self.clone();
        let order_ref = order_ref.to_string();

        tokio::spawn(async move { coordinator.run(account_id, &order_ref, cost, action).await })
            .await
            .map_err(|e| LedgerError::ExternalActionFailed(format!("order task aborted: {e}")))?
    }

    async fn run<T, F, Fut>(
        &self,
        account_id: Uuid,
        order_ref: &str,
        cost: i64,
        action: F,
    ) -> LedgerResult<OrderResult<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let debit = match self.ledger.debit_for_order(account_id, cost, order_ref).await {
            Ok(debit) => debit,
            Err(LedgerError::InsufficientCredits {
                available,
                requested,
            }) => {
                return Ok(OrderResult::InsufficientCredits {
                    available,
                    requested,
                })
            }
            Err(e) => return Err(e),
        };

        let mut task = tokio::spawn(action());
        let outcome = match tokio::time::timeout(self.action_timeout, &mut task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(e)) => Err(format!("action aborted: {e}")),
            Err(_) => {
                task.abort();
                Err(format!(
                    "action timed out after {} ms",
                    self.action_timeout.as_millis()
                ))
            }
        };

        match outcome {
            Ok(output) => {
                if let Some(debit_id) = debit.debit_id {
                    // The work happened; a debit left pending still holds the credits
                    if let Err(e) = self.finalize_with_retry(debit_id).await {
                        error!(debit_id = %debit_id, error = %e, "Failed to commit debit after successful action");
                    }
                }
                info!(order_ref, cost, "Order action completed");
                Ok(OrderResult::Completed { debit, output })
            }
            Err(reason) => {
                warn!(order_ref, reason = %reason, "Order action failed, reversing debit");
                let reversal = match debit.debit_id {
                    Some(debit_id) => Some(self.reverse_with_retry(debit_id, &reason).await?),
                    None => None,
                };
                Ok(OrderResult::Failed {
                    reason,
                    debit_id: debit.debit_id,
                    reversal,
                })
            }
        }
    }

    fn backoff() -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(MAX_LEDGER_RETRIES)
            .with_jitter()
            .build()
    }

    async fn reverse_with_retry(&self, debit_id: Uuid, reason: &str) -> LedgerResult<ReversalOutcome> {
        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(Self::backoff()).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.ledger.reverse(debit_id, Some(reason)).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() => {
                    warn!(attempt = attempt + 1, debit_id = %debit_id, error = %e, "Reversal conflicted, retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "retries exhausted".to_string());
        error!(debit_id = %debit_id, reason = %reason, "Debit could not be reversed");
        Err(LedgerError::ReversalFailed { debit_id, reason })
    }

    async fn finalize_with_retry(&self, debit_id: Uuid) -> LedgerResult<()> {
        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(Self::backoff()).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.ledger.finalize(debit_id).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LedgerError::StorageConflict(format!("debit {debit_id} could not be committed"))
        }))
    }
}
