use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 开始前至少 hours_before 小时取消可退 refund_percent%
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "cancellation_policy_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub policy_id: i64,
    pub hours_before: i32,
    pub refund_percent: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
