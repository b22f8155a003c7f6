//! `SeaORM` Entity for customer accounts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub external_ref: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::credit_batches::Entity")]
    CreditBatches,
    #[sea_orm(has_many = "super::debit_transactions::Entity")]
    DebitTransactions,
}

impl Related<super::credit_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditBatches.def()
    }
}

impl Related<super::debit_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DebitTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
