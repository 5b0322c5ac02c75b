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
pub enum BookingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
        }
    }
}

/// 预订记录
/// - units: 本次预订占用的容量（活动人数 / 餐饮份数 / 餐厅人数 / 民宿固定为1）
/// - 金额字段均为美分
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub provider_id: i64,
    pub order_id: Option<i64>,
    pub reference: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub units: i32,
    pub booking_details: Json,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub points_used: i64,
    pub points_value: i64,
    pub total: i64,
    pub status: BookingStatus,
    pub payment_method: String,
    pub coupon_code: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// 是否仍占用容量
    pub fn is_active(&self) -> bool {
        !matches!(self.status, BookingStatus::Cancelled)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
