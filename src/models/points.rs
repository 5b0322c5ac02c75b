use crate::entities::{LedgerEntryType, points_ledger_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsBalanceResponse {
    pub user_id: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointsLedgerEntryResponse {
    pub id: i64,
    pub entry_type: LedgerEntryType,
    pub points: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub booking_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<points_ledger_entity::Model> for PointsLedgerEntryResponse {
    fn from(m: points_ledger_entity::Model) -> Self {
        Self {
            id: m.id,
            entry_type: m.entry_type,
            points: m.points,
            expires_at: m.expires_at,
            booking_id: m.booking_id,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct PointsHistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExpirePointsResponse {
    pub entries: u64,
    pub points: i64,
}
