use crate::entities::{
    PaymentStatus, SettlementStatus, WalletKind, invoice_entity as invoices,
    payment_transaction_entity as payments,
};
use crate::error::{AppError, AppResult};
use crate::services::payment_service::PaymentService;
use crate::services::wallet_service::{WalletReference, WalletService};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait,
};

/// 服务方净额 / 平台抽成拆分。
/// 积分抵扣可能使实付低于服务方应得，此时服务方拿走全部实付，平台抽成为 0。
pub fn split_charge(charged: i64, provider_share: i64) -> (i64, i64) {
    let provider_net = provider_share.clamp(0, charged.max(0));
    (provider_net, charged - provider_net)
}

/// 部分结算金额必须非负且恰好等于托管金额
pub fn check_partial_split(held: i64, provider_amount: i64, customer_amount: i64) -> AppResult<()> {
    if provider_amount < 0 || customer_amount < 0 {
        return Err(AppError::Unprocessable(
            "settlement amounts must not be negative".into(),
        ));
    }
    if provider_amount + customer_amount != held {
        return Err(AppError::Unprocessable(format!(
            "provider {provider_amount} + customer {customer_amount} must equal held amount {held}"
        )));
    }
    Ok(())
}

/// 取消退款拆分：(服务方, 托管退回, 平台退回)。
/// 先用托管金额退款，超出部分由平台抽成承担，退款上限为实付总额。
pub fn cancellation_split(held: i64, platform_fee: i64, refund: i64) -> (i64, i64, i64) {
    let refund = refund.clamp(0, held + platform_fee);
    let from_escrow = refund.min(held);
    (held - from_escrow, from_escrow, refund - from_escrow)
}

#[derive(Clone)]
pub struct EscrowService {
    pool: DatabaseConnection,
    payment_service: PaymentService,
    wallet_service: WalletService,
}

impl EscrowService {
    pub fn new(
        pool: DatabaseConnection,
        payment_service: PaymentService,
        wallet_service: WalletService,
    ) -> Self {
        Self {
            pool,
            payment_service,
            wallet_service,
        }
    }

    pub async fn hold(&self, payment_transaction_id: i64) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = self.hold_tx(&txn, payment_transaction_id).await?;
        txn.commit().await?;
        Ok(payment)
    }

    /// 扣款成功后按发票拆分入账 escrow / admin，已托管则直接返回
    pub async fn hold_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        let payment = self.payment_service.lock_tx(txn, payment_transaction_id).await?;
        if payment.settlement_status.is_some() {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Succeeded {
            return Err(AppError::Unprocessable(format!(
                "Payment {payment_transaction_id} has not succeeded"
            )));
        }
        let order_id = payment.order_id.ok_or_else(|| {
            AppError::Unprocessable(format!(
                "Payment {payment_transaction_id} is not linked to an order"
            ))
        })?;
        let invoice = invoices::Entity::find()
            .filter(invoices::Column::OrderId.eq(order_id))
            .one(txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice for order {order_id} not found")))?;

        let (provider_net, platform_cut) = split_charge(payment.amount, invoice.provider_amount);
        let escrow = self.wallet_service.system_wallet(txn, WalletKind::Escrow).await?;
        let admin = self.wallet_service.system_wallet(txn, WalletKind::Admin).await?;
        let reference = WalletReference::payment(payment.id, "escrow hold");

        let method = self.payment_service.method(&payment.method)?;
        if method.settles_through_clearing() {
            let clearing = self.wallet_service.system_wallet(txn, WalletKind::Clearing).await?;
            self.wallet_service
                .transfer_tx(txn, clearing.id, escrow.id, provider_net, reference)
                .await?;
            self.wallet_service
                .transfer_tx(txn, clearing.id, admin.id, platform_cut, reference)
                .await?;
        } else {
            self.wallet_service
                .apply_tx(txn, escrow.id, provider_net, reference)
                .await?;
            self.wallet_service
                .apply_tx(txn, admin.id, platform_cut, reference)
                .await?;
        }

        let mut am = payment.into_active_model();
        am.settlement_status = Set(Some(SettlementStatus::Held));
        am.held_amount = Set(provider_net);
        am.platform_fee = Set(platform_cut);
        am.updated_at = Set(Utc::now());
        let held = am.update(txn).await?;
        log::info!(
            "escrow hold: payment={} provider_net={provider_net} platform_cut={platform_cut}",
            held.id
        );
        Ok(held)
    }

    async fn locked_held(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        // 预订后托管失败（尽力而为）时在此补做
        let payment = self.hold_tx(txn, payment_transaction_id).await?;
        if payment.settlement_status != Some(SettlementStatus::Held) {
            return Err(AppError::Unprocessable(format!(
                "Payment {payment_transaction_id} is not held in escrow"
            )));
        }
        Ok(payment)
    }

    async fn pay_provider(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        amount: i64,
    ) -> AppResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let provider_id = payment.provider_id.ok_or_else(|| {
            AppError::InternalError(format!("Payment {} has no provider", payment.id))
        })?;
        let escrow = self.wallet_service.system_wallet(txn, WalletKind::Escrow).await?;
        let provider_wallet = self.wallet_service.user_wallet_tx(txn, provider_id).await?;
        self.wallet_service
            .transfer_tx(
                txn,
                escrow.id,
                provider_wallet.id,
                amount,
                WalletReference::payment(payment.id, "escrow release"),
            )
            .await
    }

    async fn refund_customer(
        &self,
        txn: &DatabaseTransaction,
        payment: &payments::Model,
        from: WalletKind,
        amount: i64,
    ) -> AppResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let source = self.wallet_service.system_wallet(txn, from).await?;
        let method = self.payment_service.method(&payment.method)?;
        method.refund_tx(txn, payment, amount, Some(source.id)).await
    }

    async fn mark(
        &self,
        txn: &DatabaseTransaction,
        payment: payments::Model,
        settlement: SettlementStatus,
        status: Option<PaymentStatus>,
    ) -> AppResult<payments::Model> {
        let mut am = payment.into_active_model();
        am.settlement_status = Set(Some(settlement));
        if let Some(status) = status {
            am.status = Set(status);
        }
        am.updated_at = Set(Utc::now());
        Ok(am.update(txn).await?)
    }

    pub async fn release_to_provider(
        &self,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = self.release_to_provider_tx(&txn, payment_transaction_id).await?;
        txn.commit().await?;
        Ok(payment)
    }

    pub async fn release_to_provider_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        let payment = self.locked_held(txn, payment_transaction_id).await?;
        self.pay_provider(txn, &payment, payment.held_amount).await?;
        let released = self.mark(txn, payment, SettlementStatus::Released, None).await?;
        log::info!(
            "escrow released: payment={} amount={}",
            released.id,
            released.held_amount
        );
        Ok(released)
    }

    /// 全额退款，包括平台抽成
    pub async fn refund_to_customer(
        &self,
        payment_transaction_id: i64,
    ) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = self.locked_held(&txn, payment_transaction_id).await?;
        self.refund_customer(&txn, &payment, WalletKind::Escrow, payment.held_amount)
            .await?;
        self.refund_customer(&txn, &payment, WalletKind::Admin, payment.platform_fee)
            .await?;
        let refunded = self
            .mark(
                &txn,
                payment,
                SettlementStatus::Refunded,
                Some(PaymentStatus::Refunded),
            )
            .await?;
        txn.commit().await?;
        log::info!("escrow refunded: payment={}", refunded.id);
        Ok(refunded)
    }

    pub async fn partial_settle(
        &self,
        payment_transaction_id: i64,
        provider_amount: i64,
        customer_amount: i64,
    ) -> AppResult<payments::Model> {
        let txn = self.pool.begin().await?;
        let payment = self
            .partial_settle_tx(&txn, payment_transaction_id, provider_amount, customer_amount)
            .await?;
        txn.commit().await?;
        Ok(payment)
    }

    pub async fn partial_settle_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
        provider_amount: i64,
        customer_amount: i64,
    ) -> AppResult<payments::Model> {
        let payment = self.locked_held(txn, payment_transaction_id).await?;
        check_partial_split(payment.held_amount, provider_amount, customer_amount)?;

        self.pay_provider(txn, &payment, provider_amount).await?;
        self.refund_customer(txn, &payment, WalletKind::Escrow, customer_amount)
            .await?;
        let settled = self
            .mark(txn, payment, SettlementStatus::PartiallyReleased, None)
            .await?;
        log::info!(
            "escrow partially settled: payment={} provider={provider_amount} customer={customer_amount}",
            settled.id
        );
        Ok(settled)
    }

    /// 按取消政策退款。返回结算后的支付记录和实际退款额
    pub async fn settle_cancellation_tx(
        &self,
        txn: &DatabaseTransaction,
        payment_transaction_id: i64,
        refund_amount: i64,
    ) -> AppResult<(payments::Model, i64)> {
        let payment = self.locked_held(txn, payment_transaction_id).await?;
        let (provider, from_escrow, from_admin) =
            cancellation_split(payment.held_amount, payment.platform_fee, refund_amount);

        self.pay_provider(txn, &payment, provider).await?;
        self.refund_customer(txn, &payment, WalletKind::Escrow, from_escrow)
            .await?;
        self.refund_customer(txn, &payment, WalletKind::Admin, from_admin)
            .await?;

        let refunded = from_escrow + from_admin;
        let settled = if refunded == payment.held_amount + payment.platform_fee && refunded > 0 {
            self.mark(
                txn,
                payment,
                SettlementStatus::Refunded,
                Some(PaymentStatus::Refunded),
            )
            .await?
        } else {
            self.mark(txn, payment, SettlementStatus::PartiallyReleased, None)
                .await?
        };
        log::info!(
            "escrow cancellation settled: payment={} provider={provider} escrow_refund={from_escrow} platform_refund={from_admin}",
            settled.id
        );
        Ok((settled, refunded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_charge() {
        assert_eq!(split_charge(11_000, 9_000), (9_000, 2_000));
        // 积分抵扣超过佣金 + 税
        assert_eq!(split_charge(8_000, 9_000), (8_000, 0));
        assert_eq!(split_charge(0, 9_000), (0, 0));
    }

    #[test]
    fn test_partial_split_must_sum_to_held() {
        assert!(check_partial_split(9_000, 4_500, 4_500).is_ok());
        assert!(matches!(
            check_partial_split(9_000, 5_000, 5_000),
            Err(AppError::Unprocessable(_))
        ));
        assert!(check_partial_split(9_000, -1, 9_001).is_err());
    }

    #[test]
    fn test_cancellation_split_reaches_into_platform_cut() {
        // 50%：托管足够覆盖
        assert_eq!(cancellation_split(9_000, 1_000, 5_000), (4_000, 5_000, 0));
        // 100%：超出托管的部分从平台抽成退回
        assert_eq!(cancellation_split(9_000, 1_000, 10_000), (0, 9_000, 1_000));
        assert_eq!(cancellation_split(9_000, 1_000, 12_000), (0, 9_000, 1_000));
        assert_eq!(cancellation_split(9_000, 1_000, 0), (9_000, 0, 0));
    }
}
