use crate::entities::{WalletKind, wallet_entity as wallets, wallet_transaction_entity as wallet_txs};
use crate::error::{AppError, AppResult};
use crate::models::WalletResponse;
use crate::services::catalog_service::{LockMode, with_lock};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};

const RECENT_TRANSACTIONS: u64 = 20;

/// 资金流水的业务来源
#[derive(Debug, Clone, Copy)]
pub struct WalletReference<'a> {
    pub reference_type: &'a str,
    pub reference_id: Option<i64>,
    pub description: &'a str,
}

impl<'a> WalletReference<'a> {
    pub fn payment(payment_transaction_id: i64, description: &'a str) -> Self {
        Self {
            reference_type: "payment_transaction",
            reference_id: Some(payment_transaction_id),
            description,
        }
    }
}

#[derive(Clone)]
pub struct WalletService {
    pool: DatabaseConnection,
}

impl WalletService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    pub async fn get_user_wallet(&self, user_id: i64) -> AppResult<WalletResponse> {
        let wallet = wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_id))
            .filter(wallets::Column::Kind.eq(WalletKind::User))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Wallet not found".into()))?;
        let recent = wallet_txs::Entity::find()
            .filter(wallet_txs::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_txs::Column::Id)
            .limit(RECENT_TRANSACTIONS)
            .all(&self.pool)
            .await?;
        Ok(WalletResponse::new(wallet, recent))
    }

    /// clearing / escrow / admin 系统钱包（迁移时创建）
    pub async fn system_wallet<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: WalletKind,
    ) -> AppResult<wallets::Model> {
        if kind == WalletKind::User {
            return Err(AppError::InternalError("user wallet is not a system wallet".into()));
        }
        wallets::Entity::find()
            .filter(wallets::Column::Kind.eq(kind))
            .filter(wallets::Column::UserId.is_null())
            .one(conn)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("System wallet {kind:?} is missing")))
    }

    /// 用户钱包，不存在则创建
    pub async fn user_wallet_tx(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
    ) -> AppResult<wallets::Model> {
        if let Some(wallet) = wallets::Entity::find()
            .filter(wallets::Column::UserId.eq(user_id))
            .filter(wallets::Column::Kind.eq(WalletKind::User))
            .one(txn)
            .await?
        {
            return Ok(wallet);
        }
        let wallet = wallets::ActiveModel {
            user_id: Set(Some(user_id)),
            kind: Set(WalletKind::User),
            balance: Set(0),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(wallet)
    }

    async fn lock_wallet(txn: &DatabaseTransaction, wallet_id: i64) -> AppResult<wallets::Model> {
        with_lock(wallets::Entity::find_by_id(wallet_id), LockMode::Exclusive)
            .one(txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet {wallet_id} not found")))
    }

    /// 记一笔变动（正数入账，负数出账），余额不得为负
    pub async fn apply_tx(
        &self,
        txn: &DatabaseTransaction,
        wallet_id: i64,
        amount: i64,
        reference: WalletReference<'_>,
    ) -> AppResult<wallets::Model> {
        let wallet = Self::lock_wallet(txn, wallet_id).await?;
        self.apply_locked(txn, wallet, amount, reference).await
    }

    async fn apply_locked(
        &self,
        txn: &DatabaseTransaction,
        wallet: wallets::Model,
        amount: i64,
        reference: WalletReference<'_>,
    ) -> AppResult<wallets::Model> {
        if amount == 0 {
            return Ok(wallet);
        }
        let balance_after = wallet.balance + amount;
        if balance_after < 0 {
            return Err(AppError::InsufficientBalance(format!(
                "Wallet {} balance {} is less than {}",
                wallet.id, wallet.balance, -amount
            )));
        }

        let wallet_id = wallet.id;
        let mut am = wallet.into_active_model();
        am.balance = Set(balance_after);
        am.updated_at = Set(Utc::now());
        let updated = am.update(txn).await?;

        wallet_txs::ActiveModel {
            wallet_id: Set(wallet_id),
            amount: Set(amount),
            balance_after: Set(balance_after),
            reference_type: Set(reference.reference_type.to_string()),
            reference_id: Set(reference.reference_id),
            description: Set(Some(reference.description.to_string())),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        Ok(updated)
    }

    /// 两个钱包之间转账，按 id 升序加锁
    pub async fn transfer_tx(
        &self,
        txn: &DatabaseTransaction,
        from_wallet_id: i64,
        to_wallet_id: i64,
        amount: i64,
        reference: WalletReference<'_>,
    ) -> AppResult<()> {
        if amount < 0 {
            return Err(AppError::ValidationError("transfer amount must not be negative".into()));
        }
        if amount == 0 || from_wallet_id == to_wallet_id {
            return Ok(());
        }
        let (first, second) = if from_wallet_id < to_wallet_id {
            (from_wallet_id, to_wallet_id)
        } else {
            (to_wallet_id, from_wallet_id)
        };
        let first = Self::lock_wallet(txn, first).await?;
        let second = Self::lock_wallet(txn, second).await?;
        let (from, to) = if first.id == from_wallet_id {
            (first, second)
        } else {
            (second, first)
        };

        self.apply_locked(txn, from, -amount, reference).await?;
        self.apply_locked(txn, to, amount, reference).await?;
        Ok(())
    }
}
