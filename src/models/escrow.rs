use crate::entities::{PaymentStatus, SettlementStatus, payment_transaction_entity};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartialSettleRequest {
    pub provider_amount: i64,
    pub customer_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentTransactionResponse {
    pub id: i64,
    pub booking_id: Option<i64>,
    pub order_id: Option<i64>,
    pub method: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub settlement_status: Option<SettlementStatus>,
    pub held_amount: i64,
    pub platform_fee: i64,
}

impl From<payment_transaction_entity::Model> for PaymentTransactionResponse {
    fn from(m: payment_transaction_entity::Model) -> Self {
        Self {
            id: m.id,
            booking_id: m.booking_id,
            order_id: m.order_id,
            method: m.method,
            amount: m.amount,
            currency: m.currency,
            status: m.status,
            settlement_status: m.settlement_status,
            held_amount: m.held_amount,
            platform_fee: m.platform_fee,
        }
    }
}
