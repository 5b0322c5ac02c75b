//! 支付方式策略表: wallet / test / gateway
//!
//! 资金路径:
//! - wallet: 扣款时 用户钱包 -> clearing，托管时 clearing -> escrow / admin
//! - gateway / test: 扣款在系统外完成，托管时直接入账 escrow / admin

use crate::entities::{PaymentStatus, WalletKind, payment_transaction_entity as payments};
use crate::error::{AppError, AppResult};
use crate::external::PaymentGateway;
use crate::models::PaymentWebhookEvent;
use crate::services::catalog_service::{LockMode, with_lock};
use crate::services::wallet_service::{WalletReference, WalletService};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const METHOD_WALLET: &str = "wallet";
pub const METHOD_TEST: &str = "test";
pub const METHOD_GATEWAY: &str = "gateway";

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_transaction_id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub token: Option<String>,
    pub description: String,
}

#[async_trait]
pub trait PaymentMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// 扣款成功的资金是否停在 clearing 钱包
    fn settles_through_clearing(&self) -> bool {
        false
    }

    /// 返回网关侧引用
    async fn charge(&self, request: &ChargeRequest) -> AppResult<String>;

    /// 退还 amount 给付款人。`source_wallet_id` 为资金当前所在的系统钱包（未入账时为 None）
    async fn refund_tx(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        amount: i64,
        source_wallet_id: Option<i64>,
    ) -> AppResult<()>;
}

/// 站内钱包余额支付
pub struct WalletPaymentMethod {
    pool: DatabaseConnection,
    wallets: WalletService,
}

impl WalletPaymentMethod {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self {
            wallets: WalletService::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl PaymentMethod for WalletPaymentMethod {
    fn name(&self) -> &'static str {
        METHOD_WALLET
    }

    fn settles_through_clearing(&self) -> bool {
        true
    }

    async fn charge(&self, request: &ChargeRequest) -> AppResult<String> {
        let txn = self.pool.begin().await?;
        let user_wallet = self.wallets.user_wallet_tx(&txn, request.user_id).await?;
        let clearing = self.wallets.system_wallet(&txn, WalletKind::Clearing).await?;
        self.wallets
            .transfer_tx(
                &txn,
                user_wallet.id,
                clearing.id,
                request.amount,
                WalletReference::payment(request.payment_transaction_id, &request.description),
            )
            .await?;
        txn.commit().await?;
        Ok(format!("wallet_{}", request.payment_transaction_id))
    }

    async fn refund_tx(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        amount: i64,
        source_wallet_id: Option<i64>,
    ) -> AppResult<()> {
        let source = match source_wallet_id {
            Some(id) => id,
            None => self.wallets.system_wallet(txn, WalletKind::Clearing).await?.id,
        };
        let user_wallet = self.wallets.user_wallet_tx(txn, payment.user_id).await?;
        self.wallets
            .transfer_tx(
                txn,
                source,
                user_wallet.id,
                amount,
                WalletReference::payment(payment.id, "refund"),
            )
            .await
    }
}

/// 开发 / 测试用，token 为 "fail" 时模拟拒付
pub struct TestPaymentMethod {
    wallets: WalletService,
}

impl TestPaymentMethod {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self {
            wallets: WalletService::new(pool),
        }
    }
}

#[async_trait]
impl PaymentMethod for TestPaymentMethod {
    fn name(&self) -> &'static str {
        METHOD_TEST
    }

    async fn charge(&self, request: &ChargeRequest) -> AppResult<String> {
        if request.token.as_deref() == Some("fail") {
            return Err(AppError::PaymentFailed("test card declined".into()));
        }
        Ok(format!("test_{}", Uuid::new_v4().simple()))
    }

    async fn refund_tx(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        amount: i64,
        source_wallet_id: Option<i64>,
    ) -> AppResult<()> {
        if let Some(source) = source_wallet_id {
            self.wallets
                .apply_tx(txn, source, -amount, WalletReference::payment(payment.id, "refund"))
                .await?;
        }
        Ok(())
    }
}

/// 外部网关支付
pub struct GatewayPaymentMethod {
    gateway: Arc<dyn PaymentGateway>,
    wallets: WalletService,
}

impl GatewayPaymentMethod {
    pub fn new(gateway: Arc<dyn PaymentGateway>, pool: DatabaseConnection) -> Self {
        Self {
            gateway,
            wallets: WalletService::new(pool),
        }
    }
}

#[async_trait]
impl PaymentMethod for GatewayPaymentMethod {
    fn name(&self) -> &'static str {
        METHOD_GATEWAY
    }

    async fn charge(&self, request: &ChargeRequest) -> AppResult<String> {
        let token = request
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::ValidationError("payment_token is required".into()))?;
        let charge = self
            .gateway
            .charge(
                request.amount,
                token,
                &request.description,
                &format!("ptx-{}", request.payment_transaction_id),
            )
            .await?;
        Ok(charge.reference)
    }

    async fn refund_tx(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        amount: i64,
        source_wallet_id: Option<i64>,
    ) -> AppResult<()> {
        let reference = payment.gateway_reference.as_deref().ok_or_else(|| {
            AppError::InternalError(format!("Payment {} has no gateway reference", payment.id))
        })?;
        // 先扣系统钱包，网关退款失败时整个事务回滚
        if let Some(source) = source_wallet_id {
            self.wallets
                .apply_tx(txn, source, -amount, WalletReference::payment(payment.id, "refund"))
                .await?;
        }
        self.gateway.refund(reference, amount).await
    }
}

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    currency: String,
    methods: HashMap<String, Arc<dyn PaymentMethod>>,
}

impl PaymentService {
    pub fn new(pool: DatabaseConnection, currency: impl Into<String>) -> Self {
        Self {
            pool,
            currency: currency.into(),
            methods: HashMap::new(),
        }
    }

    pub fn with_method(mut self, method: Arc<dyn PaymentMethod>) -> Self {
        self.methods.insert(method.name().to_string(), method);
        self
    }

    pub fn method(&self, name: &str) -> AppResult<Arc<dyn PaymentMethod>> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::ValidationError(format!("Unsupported payment method: {name}")))
    }

    /// 扣款并记录 payment_transactions。
    /// 失败时记录 failed 状态并返回 PaymentFailed，不影响其他数据。
    pub async fn charge(
        &self,
        user_id: i64,
        provider_id: Option<i64>,
        method_name: &str,
        token: Option<String>,
        amount: i64,
        description: &str,
    ) -> AppResult<payments::Model> {
        if amount <= 0 {
            return Err(AppError::ValidationError("charge amount must be positive".into()));
        }
        let method = self.method(method_name)?;
        let now = Utc::now();
        let pending = payments::ActiveModel {
            user_id: Set(user_id),
            booking_id: Set(None),
            order_id: Set(None),
            provider_id: Set(provider_id),
            method: Set(method.name().to_string()),
            gateway_reference: Set(None),
            amount: Set(amount),
            currency: Set(self.currency.clone()),
            status: Set(PaymentStatus::Pending),
            settlement_status: Set(None),
            held_amount: Set(0),
            platform_fee: Set(0),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        let request = ChargeRequest {
            payment_transaction_id: pending.id,
            user_id,
            amount,
            token,
            description: description.to_string(),
        };

        match method.charge(&request).await {
            Ok(reference) => {
                let mut am = pending.into_active_model();
                am.status = Set(PaymentStatus::Succeeded);
                am.gateway_reference = Set(Some(reference));
                am.updated_at = Set(Utc::now());
                Ok(am.update(&self.pool).await?)
            }
            Err(err) => {
                log::warn!(
                    "payment {} via {} failed for user {user_id}: {err}",
                    pending.id,
                    method.name()
                );
                let reason = err.to_string();
                let mut am = pending.into_active_model();
                am.status = Set(PaymentStatus::Failed);
                am.failure_reason = Set(Some(reason.clone()));
                am.updated_at = Set(Utc::now());
                am.update(&self.pool).await?;
                match err {
                    AppError::ValidationError(_) => Err(err),
                    _ => Err(AppError::PaymentFailed(reason)),
                }
            }
        }
    }

    /// 预订未落库时的补偿退款（资金尚未托管）
    pub async fn refund_unheld(&self, payment_transaction_id: i64) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = self.lock_tx(&txn, payment_transaction_id).await?;
        if payment.status != PaymentStatus::Succeeded || payment.settlement_status.is_some() {
            return Err(AppError::Unprocessable(format!(
                "Payment {payment_transaction_id} cannot be refunded in its current state"
            )));
        }
        let method = self.method(&payment.method)?;
        method.refund_tx(&txn, &payment, payment.amount, None).await?;

        let mut am = payment.into_active_model();
        am.status = Set(PaymentStatus::Refunded);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&txn).await?;
        txn.commit().await?;
        log::warn!("payment {payment_transaction_id} refunded as compensation");
        Ok(updated)
    }

    pub async fn lock_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        with_lock(
            payments::Entity::find_by_id(payment_transaction_id),
            LockMode::Exclusive,
        )
        .one(txn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Payment transaction {payment_transaction_id} not found"))
        })
    }

    /// 关联到预订 / 订单
    pub async fn link_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
        booking_id: Option<i64>,
        order_id: i64,
    ) -> AppResult<payments::Model> {
        let payment = self.lock_tx(txn, payment_transaction_id).await?;
        let mut am = payment.into_active_model();
        am.booking_id = Set(booking_id);
        am.order_id = Set(Some(order_id));
        am.updated_at = Set(Utc::now());
        Ok(am.update(txn).await?)
    }

    /// 网关回调：同步扣款状态
    pub async fn handle_webhook_event(
        &self,
        event: &PaymentWebhookEvent,
    ) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = with_lock(
            payments::Entity::find()
                .filter(payments::Column::GatewayReference.eq(event.data.reference.clone())),
            LockMode::Exclusive,
        )
        .one(&txn)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Payment {} not found", event.data.reference))
        })?;

        let next = match event.event_type.as_str() {
            "charge.succeeded" if payment.status == PaymentStatus::Pending => {
                Some(PaymentStatus::Succeeded)
            }
            "charge.failed" if payment.status != PaymentStatus::Refunded => {
                Some(PaymentStatus::Failed)
            }
            "charge.refunded" => Some(PaymentStatus::Refunded),
            "charge.succeeded" | "charge.failed" => None,
            other => {
                log::info!("ignoring payment webhook event {other}");
                None
            }
        };

        let payment = match next {
            Some(status) if status != payment.status => {
                let id = payment.id;
                let mut am = payment.into_active_model();
                am.status = Set(status);
                if status == PaymentStatus::Failed {
                    am.failure_reason = Set(event.data.failure_reason.clone());
                }
                am.updated_at = Set(Utc::now());
                let updated = am.update(&txn).await?;
                log::info!("payment {id} moved to {status:?} by webhook");
                updated
            }
            _ => payment,
        };
        txn.commit().await?;
        Ok(payment)
    }
}
