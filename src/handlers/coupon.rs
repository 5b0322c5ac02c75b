use crate::middlewares::current_user;
use crate::models::*;
use crate::services::CouponService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/coupons/validate",
    tag = "coupon",
    request_body = ValidateCouponRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "优惠码可用", body = CouponValidationResponse),
        (status = 400, description = "优惠码无效或不适用")
    )
)]
pub async fn validate_coupon(
    coupon_service: web::Data<CouponService>,
    req: HttpRequest,
    body: web::Json<ValidateCouponRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match coupon_service
        .validate_for_service(user.user_id, body.service_id, &body.code, body.subtotal)
        .await
    {
        Ok(quote) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": CouponValidationResponse {
                code: quote.coupon.code,
                discount_type: quote.coupon.discount_type,
                discount_amount: quote.discount,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn coupon_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/coupons").route("/validate", web::post().to(validate_coupon)));
}
