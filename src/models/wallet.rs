use crate::entities::{WalletKind, wallet_entity, wallet_transaction_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletTransactionResponse {
    pub id: i64,
    /// 正数入账，负数出账（美分）
    pub amount: i64,
    pub balance_after: i64,
    pub reference_type: String,
    pub reference_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<wallet_transaction_entity::Model> for WalletTransactionResponse {
    fn from(m: wallet_transaction_entity::Model) -> Self {
        Self {
            id: m.id,
            amount: m.amount,
            balance_after: m.balance_after,
            reference_type: m.reference_type,
            reference_id: m.reference_id,
            description: m.description,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    pub id: i64,
    pub kind: WalletKind,
    pub balance: i64,
    pub recent_transactions: Vec<WalletTransactionResponse>,
}

impl WalletResponse {
    pub fn new(
        wallet: wallet_entity::Model,
        recent: Vec<wallet_transaction_entity::Model>,
    ) -> Self {
        Self {
            id: wallet.id,
            kind: wallet.kind,
            balance: wallet.balance,
            recent_transactions: recent.into_iter().map(Into::into).collect(),
        }
    }
}
