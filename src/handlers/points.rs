use crate::middlewares::current_user;
use crate::models::*;
use crate::services::PointsLedgerService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/points/balance",
    tag = "points",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "可用积分（不含已过期）", body = PointsBalanceResponse)
    )
)]
pub async fn get_balance(
    points_service: web::Data<PointsLedgerService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match points_service.balance(user.user_id).await {
        Ok(balance) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": PointsBalanceResponse {
                user_id: user.user_id,
                balance,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/points/history",
    tag = "points",
    params(PointsHistoryQuery),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "积分流水")
    )
)]
pub async fn get_history(
    points_service: web::Data<PointsLedgerService>,
    req: HttpRequest,
    query: web::Query<PointsHistoryQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    let params = PaginationParams::new(query.page, query.per_page);

    match points_service.history(user.user_id, params).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": page
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn points_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/points")
            .route("/balance", web::get().to(get_balance))
            .route("/history", web::get().to(get_history)),
    );
}
