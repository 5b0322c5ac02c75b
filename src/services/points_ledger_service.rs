use crate::entities::{LedgerEntryType, points_ledger_entity as ledger};
use crate::error::{AppError, AppResult};
use crate::models::{PaginatedResponse, PaginationParams, PointsLedgerEntryResponse};
use crate::services::catalog_service::{LockMode, with_lock};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::HashMap;

/// 一条 earn 记录的剩余可用积分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnLot {
    pub entry: ledger::Model,
    pub remaining: i64,
}

/// 由流水推导出的账户状态（余额从不落库）
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pub lots: Vec<EarnLot>,
    /// 没有来源 earn 行的扣减（历史数据），从余额中整体扣除
    pub unsourced_debits: i64,
}

impl LedgerState {
    pub fn from_entries(entries: Vec<ledger::Model>) -> Self {
        let mut consumed: HashMap<i64, i64> = HashMap::new();
        let mut unsourced_debits = 0;
        let mut earns = Vec::new();
        for entry in entries {
            match (entry.entry_type, entry.source_entry_id) {
                (LedgerEntryType::Earn, _) => earns.push(entry),
                (_, Some(source)) => *consumed.entry(source).or_default() += entry.points,
                (_, None) => unsourced_debits += entry.points,
            }
        }
        let lots = earns
            .into_iter()
            .map(|entry| {
                let used = consumed.get(&entry.id).copied().unwrap_or(0);
                let remaining = (entry.points - used).max(0);
                EarnLot { entry, remaining }
            })
            .collect();
        Self {
            lots,
            unsourced_debits,
        }
    }

    pub fn balance(&self, now: DateTime<Utc>) -> i64 {
        let live: i64 = self
            .lots
            .iter()
            .filter(|lot| !lot.entry.is_expired_at(now))
            .map(|lot| lot.remaining)
            .sum();
        (live - self.unsourced_debits).max(0)
    }

    /// 先到期先用，同到期按 id；无到期时间的排在最后
    pub fn spendable_lots(&self, now: DateTime<Utc>) -> Vec<&EarnLot> {
        let mut lots: Vec<&EarnLot> = self
            .lots
            .iter()
            .filter(|lot| lot.remaining > 0 && !lot.entry.is_expired_at(now))
            .collect();
        lots.sort_by_key(|lot| (lot.entry.expires_at.is_none(), lot.entry.expires_at, lot.entry.id));
        lots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireSummary {
    pub entries: u64,
    pub points: i64,
}

#[derive(Clone)]
pub struct PointsLedgerService {
    pool: DatabaseConnection,
}

impl PointsLedgerService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    async fn load_state<C: ConnectionTrait>(
        conn: &C,
        user_id: i64,
        lock: LockMode,
    ) -> AppResult<LedgerState> {
        let entries = with_lock(
            ledger::Entity::find()
                .filter(ledger::Column::UserId.eq(user_id))
                .order_by_asc(ledger::Column::Id),
            lock,
        )
        .all(conn)
        .await?;
        Ok(LedgerState::from_entries(entries))
    }

    pub async fn balance(&self, user_id: i64) -> AppResult<i64> {
        self.balance_in(&self.pool, user_id).await
    }

    pub async fn balance_in<C: ConnectionTrait>(&self, conn: &C, user_id: i64) -> AppResult<i64> {
        let state = Self::load_state(conn, user_id, LockMode::None).await?;
        Ok(state.balance(Utc::now()))
    }

    pub async fn earn(
        &self,
        user_id: i64,
        points: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ledger::Model> {
        let txn = self.pool.begin().await?;
        let entry = self
            .earn_tx(&txn, user_id, points, expires_at, None, json!({"reason": "manual"}))
            .await?;
        txn.commit().await?;
        Ok(entry)
    }

    pub async fn earn_tx(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        points: i64,
        expires_at: Option<DateTime<Utc>>,
        booking_id: Option<i64>,
        metadata: serde_json::Value,
    ) -> AppResult<ledger::Model> {
        if points <= 0 {
            return Err(AppError::ValidationError("points to earn must be positive".into()));
        }
        let entry = ledger::ActiveModel {
            user_id: Set(user_id),
            entry_type: Set(LedgerEntryType::Earn),
            points: Set(points),
            expires_at: Set(expires_at),
            source_entry_id: Set(None),
            booking_id: Set(booking_id),
            metadata: Set(Some(metadata)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        log::info!("points earned: user={user_id} points={points} entry={}", entry.id);
        Ok(entry)
    }

    pub async fn spend(&self, user_id: i64, points: i64) -> AppResult<Vec<ledger::Model>> {
        let txn = self.pool.begin().await?;
        let rows = self.spend_tx(&txn, user_id, points, None).await?;
        txn.commit().await?;
        Ok(rows)
    }

    /// FIFO 消耗未过期的 earn 行（行锁），每条 spend 行指向其来源 earn 行
    pub async fn spend_tx(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        points: i64,
        booking_id: Option<i64>,
    ) -> AppResult<Vec<ledger::Model>> {
        if points <= 0 {
            return Err(AppError::ValidationError("points to spend must be positive".into()));
        }
        let now = Utc::now();
        let state = Self::load_state(txn, user_id, LockMode::Exclusive).await?;
        let available = state.balance(now);
        if points > available {
            return Err(AppError::InsufficientPoints {
                requested: points,
                available,
            });
        }

        let mut left = points;
        let mut allocations = Vec::new();
        for lot in state.spendable_lots(now) {
            if left == 0 {
                break;
            }
            let take = lot.remaining.min(left);
            allocations.push((lot.entry.id, take));
            left -= take;
        }

        let mut rows = Vec::with_capacity(allocations.len());
        for (earn_id, take) in allocations {
            let row = ledger::ActiveModel {
                user_id: Set(user_id),
                entry_type: Set(LedgerEntryType::Spend),
                points: Set(take),
                expires_at: Set(None),
                source_entry_id: Set(Some(earn_id)),
                booking_id: Set(booking_id),
                metadata: Set(Some(json!({ "earn_id": earn_id }))),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(txn)
            .await?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// 将已过期 earn 行的剩余积分转为 expire 行；重复执行无副作用
    pub async fn expire_due(&self, now: DateTime<Utc>) -> AppResult<ExpireSummary> {
        let txn = self.pool.begin().await?;

        let user_ids: Vec<i64> = ledger::Entity::find()
            .filter(ledger::Column::EntryType.eq(LedgerEntryType::Earn))
            .filter(ledger::Column::ExpiresAt.is_not_null())
            .all(&txn)
            .await?
            .into_iter()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.user_id)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut summary = ExpireSummary {
            entries: 0,
            points: 0,
        };
        for user_id in user_ids {
            let state = Self::load_state(&txn, user_id, LockMode::Exclusive).await?;
            for lot in state
                .lots
                .iter()
                .filter(|lot| lot.remaining > 0 && lot.entry.is_expired_at(now))
            {
                ledger::ActiveModel {
                    user_id: Set(user_id),
                    entry_type: Set(LedgerEntryType::Expire),
                    points: Set(lot.remaining),
                    expires_at: Set(None),
                    source_entry_id: Set(Some(lot.entry.id)),
                    booking_id: Set(None),
                    metadata: Set(Some(json!({ "earn_id": lot.entry.id }))),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
                summary.entries += 1;
                summary.points += lot.remaining;
            }
        }

        txn.commit().await?;
        if summary.entries > 0 {
            log::info!(
                "points expired: entries={} points={}",
                summary.entries,
                summary.points
            );
        }
        Ok(summary)
    }

    pub async fn history(
        &self,
        user_id: i64,
        params: PaginationParams,
    ) -> AppResult<PaginatedResponse<PointsLedgerEntryResponse>> {
        let base = ledger::Entity::find().filter(ledger::Column::UserId.eq(user_id));
        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(ledger::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(
            items.into_iter().map(Into::into).collect(),
            params,
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(
        id: i64,
        entry_type: LedgerEntryType,
        points: i64,
        expires_at: Option<DateTime<Utc>>,
        source: Option<i64>,
    ) -> ledger::Model {
        ledger::Model {
            id,
            user_id: 1,
            entry_type,
            points,
            expires_at,
            source_entry_id: source,
            booking_id: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_balance_counts_only_live_remainders() {
        let now = Utc::now();
        let state = LedgerState::from_entries(vec![
            entry(1, LedgerEntryType::Earn, 100, Some(now + Duration::days(10)), None),
            entry(2, LedgerEntryType::Spend, 40, None, Some(1)),
            entry(3, LedgerEntryType::Earn, 50, Some(now - Duration::days(1)), None),
        ]);
        assert_eq!(state.balance(now), 60);
    }

    #[test]
    fn test_balance_never_negative() {
        let now = Utc::now();
        let state = LedgerState::from_entries(vec![
            entry(1, LedgerEntryType::Earn, 10, None, None),
            entry(2, LedgerEntryType::Spend, 30, None, None),
        ]);
        assert_eq!(state.balance(now), 0);
    }

    #[test]
    fn test_spendable_lots_fifo_by_expiry() {
        let now = Utc::now();
        let state = LedgerState::from_entries(vec![
            entry(1, LedgerEntryType::Earn, 10, None, None),
            entry(2, LedgerEntryType::Earn, 10, Some(now + Duration::days(30)), None),
            entry(3, LedgerEntryType::Earn, 10, Some(now + Duration::days(5)), None),
        ]);
        let order: Vec<i64> = state
            .spendable_lots(now)
            .into_iter()
            .map(|lot| lot.entry.id)
            .collect();
        assert_eq!(order, vec![3, 2, 1]);
    }
}
