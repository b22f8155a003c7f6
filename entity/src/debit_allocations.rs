//! `SeaORM` Entity for the per-batch breakdown of a debit.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "debit_allocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub debit_id: Uuid,
    pub batch_id: Uuid,
    pub amount: i64,
    /// Position in the consumption order, so reads return the breakdown as taken.
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::debit_transactions::Entity",
        from = "Column::DebitId",
        to = "super::debit_transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    DebitTransactions,
    #[sea_orm(
        belongs_to = "super::credit_batches::Entity",
        from = "Column::BatchId",
        to = "super::credit_batches::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    CreditBatches,
}

impl Related<super::debit_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DebitTransactions.def()
    }
}

impl Related<super::credit_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
