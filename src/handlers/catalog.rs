use crate::models::*;
use crate::services::AvailabilityService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/services/{id}/availability",
    tag = "catalog",
    params(
        ("id" = i64, Path, description = "服务ID"),
        AvailabilityQuery
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "时段剩余容量", body = AvailabilityResponse),
        (status = 404, description = "服务不存在")
    )
)]
pub async fn get_availability(
    availability_service: web::Data<AvailabilityService>,
    path: web::Path<i64>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse> {
    match availability_service
        .availability(path.into_inner(), query.starts_at, query.ends_at)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn catalog_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/services").route("/{id}/availability", web::get().to(get_availability)),
    );
}
