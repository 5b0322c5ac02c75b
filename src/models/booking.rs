use crate::entities::{BookingStatus, booking_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Fulfillment {
    Delivery,
    Pickup,
}

/// 按服务类型填写的预订明细
/// - event: people
/// - catering: quantity, addon_ids, fulfillment, delivery_address
/// - restaurant: guests
/// - property: adults, children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookingDetailsInput {
    pub people: Option<i32>,
    pub quantity: Option<i32>,
    #[serde(default)]
    pub addon_ids: Vec<i64>,
    pub fulfillment: Option<Fulfillment>,
    pub delivery_address: Option<String>,
    pub guests: Option<i32>,
    pub adults: Option<i32>,
    pub children: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub service_id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub details: BookingDetailsInput,
    /// wallet / test / gateway
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub coupon_code: Option<String>,
    pub points_to_use: Option<i64>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCateringItem {
    pub service_id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub quantity: i32,
    #[serde(default)]
    pub addon_ids: Vec<i64>,
    pub fulfillment: Fulfillment,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBulkCateringRequest {
    pub provider_id: i64,
    pub items: Vec<BulkCateringItem>,
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: i64,
    pub reference: String,
    pub service_id: i64,
    pub provider_id: i64,
    pub order_id: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub units: i32,
    #[schema(value_type = Object)]
    pub booking_details: serde_json::Value,
    pub subtotal: i64,
    pub tax: i64,
    pub discount: i64,
    pub points_used: i64,
    pub points_value: i64,
    pub total: i64,
    pub status: BookingStatus,
    pub payment_method: String,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<booking_entity::Model> for BookingResponse {
    fn from(m: booking_entity::Model) -> Self {
        Self {
            id: m.id,
            reference: m.reference,
            service_id: m.service_id,
            provider_id: m.provider_id,
            order_id: m.order_id,
            starts_at: m.starts_at,
            ends_at: m.ends_at,
            units: m.units,
            booking_details: m.booking_details,
            subtotal: m.subtotal,
            tax: m.tax,
            discount: m.discount,
            points_used: m.points_used,
            points_value: m.points_value,
            total: m.total,
            status: m.status,
            payment_method: m.payment_method,
            coupon_code: m.coupon_code,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingOutcomeResponse {
    pub booking: BookingResponse,
    pub order_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub payment_transaction_id: Option<i64>,
    /// 同一幂等键的重复请求
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkBookingOutcomeResponse {
    pub bookings: Vec<BookingResponse>,
    pub order_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub payment_transaction_id: Option<i64>,
    pub total: i64,
    pub replayed: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookingQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundQuoteResponse {
    pub booking_id: i64,
    pub hours_until_start: i64,
    pub refund_percent: i32,
    pub refund_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelBookingResponse {
    pub booking: BookingResponse,
    pub refund_percent: i32,
    pub refund_amount: i64,
    pub points_restored: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteBookingResponse {
    pub booking: BookingResponse,
    pub points_earned: i64,
    pub released_amount: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct AvailabilityQuery {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResponse {
    pub service_id: i64,
    pub capacity: i64,
    pub booked_units: i64,
    pub remaining: i64,
    /// 与服务方停业时段重叠
    pub blocked: bool,
    pub available: bool,
}
