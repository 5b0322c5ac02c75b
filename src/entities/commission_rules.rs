use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ServiceKind;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum CommissionRuleType {
    #[sea_orm(string_value = "service_type")]
    ServiceType,
    /// threshold: 服务方近30天销售额（美分）
    #[sea_orm(string_value = "volume_tier")]
    VolumeTier,
    /// threshold: 平均评分 × 100
    #[sea_orm(string_value = "rating_tier")]
    RatingTier,
}

/// 佣金附加规则，rate_bp 可为负数（折让）
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "commission_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub rule_type: CommissionRuleType,
    pub service_kind: Option<ServiceKind>,
    pub threshold: i64,
    pub rate_bp: i64,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
