use actix_cors::Cors;

/// 前端与服务方后台共用同一套 API
pub fn create_cors() -> Cors {
    Cors::default()
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
