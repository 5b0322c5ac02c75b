use crate::config::PaymentConfig;
use crate::models::PaymentWebhookEvent;
use crate::services::PaymentService;
use crate::utils::{DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, verify_signature};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use chrono::Utc;
use log::{error, info, warn};

/// 支付网关回调
///
/// 先校验 `X-Payment-Signature`，再按事件类型同步扣款状态。
pub async fn payment_webhook(
    req: HttpRequest,
    body: web::Bytes,
    payment_config: web::Data<PaymentConfig>,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse> {
    let signature = match req.headers().get(SIGNATURE_HEADER) {
        Some(sig) => sig.to_str().unwrap_or(""),
        None => {
            warn!("Missing {SIGNATURE_HEADER} header");
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Missing {SIGNATURE_HEADER} header")
            })));
        }
    };

    if let Err(e) = verify_signature(
        &payment_config.webhook_secret,
        signature,
        &body,
        Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    ) {
        error!("Webhook signature verification failed: {e}");
        return Ok(e.error_response());
    }

    let event: PaymentWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!("Invalid webhook payload: {e}");
            return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid payload"
            })));
        }
    };

    info!(
        "Received payment webhook event: {} ({})",
        event.event_type, event.data.reference
    );

    match payment_service.handle_webhook_event(&event).await {
        Ok(payment) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "received": true,
            "payment_transaction_id": payment.id,
            "status": payment.status
        }))),
        Err(e) => {
            error!("Failed to process webhook event: {e}");
            // 返回200避免网关重试，错误仅记录
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "received": true,
                "error": format!("Processing failed: {e}")
            })))
        }
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/payments", web::post().to(payment_webhook)));
}
