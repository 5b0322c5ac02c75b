use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(10))")]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    #[sea_orm(string_value = "earn")]
    Earn,
    #[sea_orm(string_value = "spend")]
    Spend,
    #[sea_orm(string_value = "expire")]
    Expire,
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Earn => write!(f, "earn"),
            LedgerEntryType::Spend => write!(f, "spend"),
            LedgerEntryType::Expire => write!(f, "expire"),
        }
    }
}

/// 积分流水（只追加，不更新）
/// - points 恒为正数，方向由 entry_type 决定
/// - source_entry_id: spend / expire 行消耗的 earn 行
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "points_ledger")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub entry_type: LedgerEntryType,
    pub points: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_entry_id: Option<i64>,
    pub booking_id: Option<i64>,
    pub metadata: Option<Json>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
