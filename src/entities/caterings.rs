use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 餐饮服务：stock 为剩余可售份数，下单时在行锁下扣减
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "caterings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub service_id: i64,
    pub price_per_unit: i64,
    pub stock: i32,
    pub min_order_qty: i32,
    pub allows_delivery: bool,
    pub allows_pickup: bool,
    pub delivery_fee: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
