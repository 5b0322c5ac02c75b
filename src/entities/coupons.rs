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
pub enum DiscountType {
    /// discount_value 为 basis points
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// discount_value 为美分
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_subtotal: i64,
    pub max_discount: Option<i64>,
    pub usage_limit: Option<i32>,
    pub per_user_limit: Option<i32>,
    pub used_count: i32,
    pub service_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
