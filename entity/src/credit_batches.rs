//! `SeaORM` Entity for credit batches, the unit of purchasing power.

use super::sea_orm_active_enums::{BatchOrigin, BatchStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount_added: i64,
    pub amount_consumed: i64,
    pub origin: BatchOrigin,
    pub external_payment_id: Option<String>,
    pub status: BatchStatus,
    pub void_reason: Option<String>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub expires_at: Option<TimeDateTimeWithTimeZone>,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Accounts,
    #[sea_orm(has_many = "super::debit_allocations::Entity")]
    DebitAllocations,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl Related<super::debit_allocations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DebitAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
