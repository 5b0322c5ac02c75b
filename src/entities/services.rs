use chrono::{DateTime, NaiveTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    #[sea_orm(string_value = "event")]
    Event,
    #[sea_orm(string_value = "catering")]
    Catering,
    #[sea_orm(string_value = "restaurant")]
    Restaurant,
    #[sea_orm(string_value = "property")]
    Property,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Event => write!(f, "event"),
            ServiceKind::Catering => write!(f, "catering"),
            ServiceKind::Restaurant => write!(f, "restaurant"),
            ServiceKind::Property => write!(f, "property"),
        }
    }
}

/// 可预订服务主表，具体定价/容量规则在 kind 对应的子表中
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub provider_id: i64,
    pub name: String,
    pub kind: ServiceKind,
    pub is_approved: bool,
    /// 平均评分 (0-5)
    pub rating: Option<f64>,
    pub opens_at: Option<NaiveTime>,
    pub closes_at: Option<NaiveTime>,
    /// 最多可提前预订的天数
    pub max_advance_days: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
