use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{BookingOutcome, BookingService, BulkBookingOutcome, CancellationService};
use crate::utils::Role;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use chrono::Utc;
use serde_json::json;

impl From<BookingOutcome> for BookingOutcomeResponse {
    fn from(o: BookingOutcome) -> Self {
        Self {
            booking: o.booking.into(),
            order_id: o.order_id,
            invoice_id: o.invoice_id,
            payment_transaction_id: o.payment_transaction_id,
            replayed: o.replayed,
        }
    }
}

impl From<BulkBookingOutcome> for BulkBookingOutcomeResponse {
    fn from(o: BulkBookingOutcome) -> Self {
        Self {
            bookings: o.bookings.into_iter().map(Into::into).collect(),
            order_id: o.order_id,
            invoice_id: o.invoice_id,
            payment_transaction_id: o.payment_transaction_id,
            total: o.total,
            replayed: o.replayed,
        }
    }
}

#[utoipa::path(
    post,
    path = "/bookings",
    tag = "booking",
    request_body = CreateBookingRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "预订成功", body = BookingOutcomeResponse),
        (status = 200, description = "幂等重放，返回原预订", body = BookingOutcomeResponse),
        (status = 402, description = "支付失败"),
        (status = 409, description = "容量 / 库存不足或时段冲突"),
        (status = 422, description = "积分或优惠码不可用")
    )
)]
pub async fn create_booking(
    booking_service: web::Data<BookingService>,
    req: HttpRequest,
    body: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match booking_service
        .create_booking(user.user_id, body.into_inner())
        .await
    {
        Ok(outcome) => {
            let replayed = outcome.replayed;
            let body = json!({
                "success": true,
                "data": BookingOutcomeResponse::from(outcome)
            });
            if replayed {
                Ok(HttpResponse::Ok().json(body))
            } else {
                Ok(HttpResponse::Created().json(body))
            }
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/bookings/bulk-catering",
    tag = "booking",
    request_body = CreateBulkCateringRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "批量餐饮预订成功", body = BulkBookingOutcomeResponse),
        (status = 409, description = "库存不足")
    )
)]
pub async fn create_bulk_catering(
    booking_service: web::Data<BookingService>,
    req: HttpRequest,
    body: web::Json<CreateBulkCateringRequest>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match booking_service
        .create_bulk_catering_booking(user.user_id, body.into_inner())
        .await
    {
        Ok(outcome) => {
            let replayed = outcome.replayed;
            let body = json!({
                "success": true,
                "data": BulkBookingOutcomeResponse::from(outcome)
            });
            if replayed {
                Ok(HttpResponse::Ok().json(body))
            } else {
                Ok(HttpResponse::Created().json(body))
            }
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/bookings",
    tag = "booking",
    params(BookingQuery),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取预订列表成功"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_bookings(
    booking_service: web::Data<BookingService>,
    req: HttpRequest,
    query: web::Query<BookingQuery>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    // 服务方查看自己收到的预订
    let as_provider = user.role == Role::Provider;

    match booking_service
        .list_bookings(user.user_id, as_provider, &query)
        .await
    {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": page.map(BookingResponse::from)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "booking",
    params(
        ("id" = i64, Path, description = "预订ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取预订成功", body = BookingResponse),
        (status = 403, description = "无权查看"),
        (status = 404, description = "预订不存在")
    )
)]
pub async fn get_booking(
    booking_service: web::Data<BookingService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match booking_service
        .get_booking(user.user_id, user.is_admin(), path.into_inner())
        .await
    {
        Ok(booking) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": BookingResponse::from(booking)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/bookings/{id}/refund-quote",
    tag = "booking",
    params(
        ("id" = i64, Path, description = "预订ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "按取消政策计算的可退金额", body = RefundQuoteResponse)
    )
)]
pub async fn refund_quote(
    booking_service: web::Data<BookingService>,
    cancellation_service: web::Data<CancellationService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    let booking = match booking_service
        .get_booking(user.user_id, user.is_admin(), path.into_inner())
        .await
    {
        Ok(b) => b,
        Err(e) => return Ok(e.error_response()),
    };

    match cancellation_service.compute_refund(&booking, Utc::now()).await {
        Ok(quote) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": RefundQuoteResponse {
                booking_id: booking.id,
                hours_until_start: quote.hours_until_start,
                refund_percent: quote.refund_percent,
                refund_amount: quote.refund_amount,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    tag = "booking",
    params(
        ("id" = i64, Path, description = "预订ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "取消成功", body = CancelBookingResponse),
        (status = 403, description = "非预订人"),
        (status = 422, description = "当前状态不可取消")
    )
)]
pub async fn cancel_booking(
    cancellation_service: web::Data<CancellationService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };

    match cancellation_service
        .cancel_booking(user.user_id, path.into_inner())
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": CancelBookingResponse {
                booking: outcome.booking.into(),
                refund_percent: outcome.quote.refund_percent,
                refund_amount: outcome.quote.refund_amount,
                points_restored: outcome.points_restored,
            },
            "message": "预订已取消"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/bookings/{id}/complete",
    tag = "booking",
    params(
        ("id" = i64, Path, description = "预订ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "服务完成，托管资金已结算", body = CompleteBookingResponse),
        (status = 403, description = "非该服务方")
    )
)]
pub async fn complete_booking(
    booking_service: web::Data<BookingService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = match current_user(&req) {
        Ok(u) => u,
        Err(e) => return Ok(e.error_response()),
    };
    if let Err(e) = user.require_role(Role::Provider) {
        return Ok(e.error_response());
    }

    match booking_service
        .complete_booking(user.user_id, path.into_inner())
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": CompleteBookingResponse {
                booking: outcome.booking.into(),
                points_earned: outcome.points_earned,
                released_amount: outcome.released_amount,
            }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn booking_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking))
            .route("", web::get().to(list_bookings))
            .route("/bulk-catering", web::post().to(create_bulk_catering))
            .route("/{id}", web::get().to(get_booking))
            .route("/{id}/refund-quote", web::get().to(refund_quote))
            .route("/{id}/cancel", web::post().to(cancel_booking))
            .route("/{id}/complete", web::post().to(complete_booking)),
    );
}
