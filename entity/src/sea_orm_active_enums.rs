//! String-backed enums shared by the ledger tables.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where a credit batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
pub enum BatchOrigin {
    #[sea_orm(string_value = "card-payment")]
    CardPayment,
    #[sea_orm(string_value = "pix-mercadopago")]
    PixMercadopago,
    #[sea_orm(string_value = "pix-inter")]
    PixInter,
    #[sea_orm(string_value = "admin-grant")]
    AdminGrant,
    #[sea_orm(string_value = "promotional")]
    Promotional,
}

impl BatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardPayment => "card-payment",
            Self::PixMercadopago => "pix-mercadopago",
            Self::PixInter => "pix-inter",
            Self::AdminGrant => "admin-grant",
            Self::Promotional => "promotional",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "card-payment" => Some(Self::CardPayment),
            "pix-mercadopago" => Some(Self::PixMercadopago),
            "pix-inter" => Some(Self::PixInter),
            "admin-grant" => Some(Self::AdminGrant),
            "promotional" => Some(Self::Promotional),
            _ => None,
        }
    }

    /// Origins produced by a payment rail (and therefore settled, not granted).
    pub fn is_payment_rail(&self) -> bool {
        matches!(
            self,
            Self::CardPayment | Self::PixMercadopago | Self::PixInter
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "void")]
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    #[sea_orm(string_value = "credited")]
    Credited,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
pub enum DebitStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "committed")]
    Committed,
    #[sea_orm(string_value = "insufficient_funds")]
    InsufficientFunds,
    #[sea_orm(string_value = "reversed")]
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[sea_orm(string_value = "human_production")]
    HumanProduction,
    #[sea_orm(string_value = "ai_synthesis")]
    AiSynthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "reserved")]
    Reserved,
    #[sea_orm(string_value = "dispatched")]
    Dispatched,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
