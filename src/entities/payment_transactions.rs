use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(30))")]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    #[sea_orm(string_value = "held")]
    Held,
    #[sea_orm(string_value = "released")]
    Released,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partially_released")]
    PartiallyReleased,
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementStatus::Held => write!(f, "held"),
            SettlementStatus::Released => write!(f, "released"),
            SettlementStatus::Refunded => write!(f, "refunded"),
            SettlementStatus::PartiallyReleased => write!(f, "partially_released"),
        }
    }
}

/// 每次扣款（钱包 / 测试 / 网关）一条记录
/// - held_amount: 托管中的服务方净额
/// - platform_fee: 已划入平台钱包的部分
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub booking_id: Option<i64>,
    pub order_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub method: String,
    pub gateway_reference: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub settlement_status: Option<SettlementStatus>,
    pub held_amount: i64,
    pub platform_fee: i64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
