use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 网关回调事件，`reference` 为网关侧的扣款 ID
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentWebhookData {
    pub reference: String,
    pub failure_reason: Option<String>,
}
