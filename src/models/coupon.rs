use crate::entities::DiscountType;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub service_id: i64,
    /// 美分
    pub subtotal: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponValidationResponse {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: i64,
}
