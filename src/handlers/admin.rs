use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{EscrowService, PointsLedgerService, SettingsProvider, validate_setting};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use chrono::Utc;
use serde_json::json;

macro_rules! require_admin {
    ($req:expr) => {
        match current_user(&$req).and_then(|u| u.require_admin().map(|_| u)) {
            Ok(u) => u,
            Err(e) => return Ok(e.error_response()),
        }
    };
}

#[utoipa::path(
    post,
    path = "/admin/escrow/{id}/release",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "支付流水ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "托管金额已转给服务方", body = PaymentTransactionResponse),
        (status = 422, description = "未处于托管状态")
    )
)]
pub async fn release_escrow(
    escrow_service: web::Data<EscrowService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin = require_admin!(req);
    let id = path.into_inner();

    match escrow_service.release_to_provider(id).await {
        Ok(payment) => {
            log::info!("admin {} released escrow for payment {id}", admin.user_id);
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": PaymentTransactionResponse::from(payment)
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/escrow/{id}/refund",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "支付流水ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "全额退款（含平台佣金）", body = PaymentTransactionResponse),
        (status = 422, description = "未处于托管状态")
    )
)]
pub async fn refund_escrow(
    escrow_service: web::Data<EscrowService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let admin = require_admin!(req);
    let id = path.into_inner();

    match escrow_service.refund_to_customer(id).await {
        Ok(payment) => {
            log::info!("admin {} refunded escrow for payment {id}", admin.user_id);
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": PaymentTransactionResponse::from(payment)
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/escrow/{id}/partial-settle",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "支付流水ID")
    ),
    request_body = PartialSettleRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "部分结算完成", body = PaymentTransactionResponse),
        (status = 422, description = "金额之和不等于托管金额")
    )
)]
pub async fn partial_settle(
    escrow_service: web::Data<EscrowService>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<PartialSettleRequest>,
) -> Result<HttpResponse> {
    let admin = require_admin!(req);
    let id = path.into_inner();

    match escrow_service
        .partial_settle(id, body.provider_amount, body.customer_amount)
        .await
    {
        Ok(payment) => {
            log::info!(
                "admin {} partially settled payment {id}: provider={} customer={}",
                admin.user_id,
                body.provider_amount,
                body.customer_amount
            );
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": PaymentTransactionResponse::from(payment)
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/settings/{key}",
    tag = "admin",
    params(
        ("key" = String, Path, description = "配置键")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "配置值，未设置时为 null", body = SettingResponse)
    )
)]
pub async fn get_setting(
    settings: web::Data<dyn SettingsProvider>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_admin!(req);
    let key = path.into_inner();

    match settings.get_setting(&key).await {
        Ok(value) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": SettingResponse { key, value }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/settings/{key}",
    tag = "admin",
    params(
        ("key" = String, Path, description = "配置键")
    ),
    request_body = UpdateSettingRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "配置已更新", body = SettingResponse),
        (status = 400, description = "配置值格式错误")
    )
)]
pub async fn put_setting(
    settings: web::Data<dyn SettingsProvider>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<UpdateSettingRequest>,
) -> Result<HttpResponse> {
    let admin = require_admin!(req);
    let key = path.into_inner();
    if let Err(e) = validate_setting(&key, &body.value) {
        return Ok(e.error_response());
    }

    match settings.set_setting(&key, &body.value).await {
        Ok(()) => {
            log::info!("admin {} set {key}={}", admin.user_id, body.value);
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": SettingResponse {
                    key,
                    value: Some(body.into_inner().value),
                }
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/points/expire",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已写入过期流水", body = ExpirePointsResponse)
    )
)]
pub async fn expire_points(
    points_service: web::Data<PointsLedgerService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    require_admin!(req);

    match points_service.expire_due(Utc::now()).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": ExpirePointsResponse {
                entries: summary.entries,
                points: summary.points,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/escrow/{id}/release", web::post().to(release_escrow))
            .route("/escrow/{id}/refund", web::post().to(refund_escrow))
            .route("/escrow/{id}/partial-settle", web::post().to(partial_settle))
            .route("/settings/{key}", web::get().to(get_setting))
            .route("/settings/{key}", web::put().to(put_setting))
            .route("/points/expire", web::post().to(expire_points)),
    );
}
