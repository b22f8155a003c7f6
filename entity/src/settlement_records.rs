//! `SeaORM` Entity for settlement records, one per `(origin, external_payment_id)`.

use super::sea_orm_active_enums::{BatchOrigin, SettlementOutcome};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "settlement_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub origin: BatchOrigin,
    pub external_payment_id: String,
    pub account_id: Uuid,
    pub amount: i64,
    pub batch_id: Option<Uuid>,
    pub outcome: SettlementOutcome,
    pub rejection_reason: Option<String>,
    pub duplicate_count: i32,
    pub last_duplicate_at: Option<TimeDateTimeWithTimeZone>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::credit_batches::Entity",
        from = "Column::BatchId",
        to = "super::credit_batches::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    CreditBatches,
}

impl Related<super::credit_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
