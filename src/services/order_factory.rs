use crate::entities::{invoice_entity as invoices, order_entity as orders};
use crate::error::AppResult;
use crate::services::commission_service::CommissionBreakdown;
use crate::utils::{generate_invoice_number, generate_order_number};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, Set};
use serde_json::json;

pub const ORDER_STATUS_PAID: &str = "paid";
pub const ORDER_STATUS_CANCELLED: &str = "cancelled";
pub const ORDER_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: i64,
    pub provider_id: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub points_value: i64,
    pub total: i64,
    pub commission: CommissionBreakdown,
    pub provider_amount: i64,
    pub platform_amount: i64,
}

#[async_trait]
pub trait OrderFactory: Send + Sync {
    async fn create_order(
        &self,
        txn: &DatabaseTransaction,
        draft: &OrderDraft,
    ) -> AppResult<orders::Model>;
}

#[async_trait]
pub trait InvoiceFactory: Send + Sync {
    async fn create_invoice(
        &self,
        txn: &DatabaseTransaction,
        order: &orders::Model,
        draft: &InvoiceDraft,
    ) -> AppResult<invoices::Model>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOrderFactory;

#[async_trait]
impl OrderFactory for DefaultOrderFactory {
    async fn create_order(
        &self,
        txn: &DatabaseTransaction,
        draft: &OrderDraft,
    ) -> AppResult<orders::Model> {
        let now = Utc::now();
        let order = orders::ActiveModel {
            user_id: Set(draft.user_id),
            provider_id: Set(draft.provider_id),
            order_number: Set(generate_order_number()),
            subtotal: Set(draft.subtotal),
            tax: Set(draft.tax),
            discount: Set(draft.discount),
            total: Set(draft.total),
            status: Set(ORDER_STATUS_PAID.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(order)
    }
}

/// 发票保存佣金明细快照，后续规则调整不影响已开发票
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInvoiceFactory;

#[async_trait]
impl InvoiceFactory for DefaultInvoiceFactory {
    async fn create_invoice(
        &self,
        txn: &DatabaseTransaction,
        order: &orders::Model,
        draft: &InvoiceDraft,
    ) -> AppResult<invoices::Model> {
        let breakdown = json!({
            "commission": draft.commission,
            "provider_amount": draft.provider_amount,
            "platform_amount": draft.platform_amount,
        });
        let invoice = invoices::ActiveModel {
            order_id: Set(order.id),
            invoice_number: Set(generate_invoice_number()),
            subtotal: Set(draft.subtotal),
            tax: Set(draft.tax),
            discount: Set(draft.discount),
            points_value: Set(draft.points_value),
            total: Set(draft.total),
            commission_amount: Set(draft.commission.total_commission),
            provider_amount: Set(draft.provider_amount),
            platform_amount: Set(draft.platform_amount),
            breakdown: Set(breakdown),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(invoice)
    }
}
