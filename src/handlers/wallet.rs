use crate::middlewares::current_user;
use crate::models::WalletResponse;
use crate::services::WalletService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/wallet",
    tag = "wallet",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "钱包余额与最近流水", body = WalletResponse),
        (status = 404, description = "钱包不存在")
    )
)]
pub async fn get_wallet(
    wallet_service: web::Data<WalletService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match wallet_service.get_user_wallet(user.user_id).await {
        Ok(wallet) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": wallet
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn wallet_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/wallet").route("", web::get().to(get_wallet)));
}
