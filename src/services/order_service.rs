use std::sync::Arc;

use entity::{
    accounts, orders,
    sea_orm_active_enums::{OrderKind, OrderStatus},
};
use sea_orm::{entity::*, DatabaseConnection};
use time::OffsetDateTime;
use tracing::{info, instrument, Instrument, Span};
use uuid::Uuid;

use crate::{
    error::{LedgerError, LedgerResult},
    models::orders::ActionDescriptor,
    services::{
        order_coordinator::{OrderCoordinator, OrderResult},
        pricing::Pricing,
        production_gateway::{ProductionGateway, ProductionReceipt},
    },
};

#[derive(Debug)]
pub struct PlacedOrder {
    pub order: orders::Model,
    pub result: OrderResult<ProductionReceipt>,
}

#[derive(Clone)]
pub struct OrderService {
    db: DatabaseConnection,
    pricing: Pricing,
    coordinator: OrderCoordinator,
    gateway: Arc<dyn ProductionGateway>,
}

impl OrderService {
    pub fn new(
        db: DatabaseConnection,
        pricing: Pricing,
        coordinator: OrderCoordinator,
        gateway: Arc<dyn ProductionGateway>,
    ) -> Self {
        Self {
            db,
            pricing,
            coordinator,
            gateway,
        }
    }

    pub fn quote(&self, descriptor: &ActionDescriptor) -> LedgerResult<(OrderKind, i64)> {
        Ok((descriptor.kind(), self.pricing.quote(descriptor)?))
    }

    /// Price the order, reserve credits and hand it to production.
    ///
    /// `quoted_cost` is what the client was shown; a different current price
    /// refuses the order before anything is debited. Once accepted, the order
    /// runs to a recorded status on its own task even if the caller stops
    /// waiting.
    #[instrument(skip(self, descriptor), fields(kind = ?descriptor.kind()))]
    pub async fn place_order(
        &self,
        account_id: Uuid,
        quoted_cost: Option<i64>,
        descriptor: ActionDescriptor,
    ) -> LedgerResult<PlacedOrder> {
        let cost = self.pricing.quote(&descriptor)?;
        if let Some(quoted) = quoted_cost {
            if quoted != cost {
                return Err(LedgerError::QuoteMismatch {
                    quoted,
                    actual: cost,
                });
            }
        }

        let service = self.clone();
        let task = async move { service.run_order(account_id, cost, descriptor).await };
        tokio::spawn(task.instrument(Span::current()))
            .await
            .map_err(|e| LedgerError::ExternalActionFailed(format!("order task aborted: {e}")))?
    }

    async fn run_order(
        &self,
        account_id: Uuid,
        cost: i64,
        descriptor: ActionDescriptor,
    ) -> LedgerResult<PlacedOrder> {
        accounts::Entity::find_by_id(account_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let order_id = Uuid::now_v7();
        let order = orders::ActiveModel {
            id: Set(order_id),
            account_id: Set(account_id),
            kind: Set(descriptor.kind()),
            cost: Set(cost),
            status: Set(OrderStatus::Reserved),
            debit_id: Set(None),
            provider_ref: Set(None),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        let gateway = Arc::clone(&self.gateway);
        let action = move || async move {
            gateway
                .execute(order_id, account_id, &descriptor)
                .await
                .map_err(anyhow::Error::from)
        };

        let result = match self
            .coordinator
            .reserve_and_execute(account_id, &order_id.to_string(), cost, action)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.update_order(order, OrderStatus::Failed, None, None, Some(e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let order = match &result {
            OrderResult::Completed { debit, output } => {
                self.update_order(
                    order,
                    output.status,
                    debit.debit_id,
                    Some(output.provider_ref.clone()),
                    None,
                )
                .await?
            }
            OrderResult::InsufficientCredits { .. } => {
                self.update_order(
                    order,
                    OrderStatus::Rejected,
                    None,
                    None,
                    Some("insufficient credits".to_string()),
                )
                .await?
            }
            OrderResult::Failed {
                reason, debit_id, ..
            } => {
                self.update_order(order, OrderStatus::Failed, *debit_id, None, Some(reason.clone()))
                    .await?
            }
        };

        info!(
            order_id = %order.id,
            account_id = %account_id,
            cost,
            status = ?order.status,
            "Order placed"
        );

        Ok(PlacedOrder { order, result })
    }

    async fn update_order(
        &self,
        order: orders::Model,
        status: OrderStatus,
        debit_id: Option<Uuid>,
        provider_ref: Option<String>,
        failure_reason: Option<String>,
    ) -> LedgerResult<orders::Model> {
        let mut active: orders::ActiveModel = order.into();
        active.status = Set(status);
        if debit_id.is_some() {
            active.debit_id = Set(debit_id);
        }
        active.provider_ref = Set(provider_ref);
        active.failure_reason = Set(failure_reason);
        active.updated_at = Set(OffsetDateTime::now_utc());
        Ok(active.update(&self.db).await?)
    }
}
