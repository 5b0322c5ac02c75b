use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 发票：breakdown 保存下单时的佣金计算快照
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub invoice_number: String,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub points_value: i64,
    pub total: i64,
    pub commission_amount: i64,
    pub provider_amount: i64,
    pub platform_amount: i64,
    pub breakdown: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
