mod common;

use actix_web::{App, ResponseError, http::StatusCode, test, web};
use common::*;
use marketplace_booking::entities::{PaymentStatus, payment_transaction_entity as payments};
use marketplace_booking::handlers::{admin_config, booking_config, webhook_config};
use marketplace_booking::middlewares::AuthMiddleware;
use marketplace_booking::services::{SettingsProvider, TAX_RATE};
use marketplace_booking::utils::{JwtService, Role, SIGNATURE_HEADER, signature_header};
use sea_orm::EntityTrait;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

fn bearer(user_id: i64, role: Role) -> (String, String) {
    let token = JwtService::new(JWT_SECRET, 3600)
        .generate_access_token(user_id, role)
        .unwrap();
    ("Authorization".to_string(), format!("Bearer {token}"))
}

macro_rules! init_app {
    ($app:expr) => {{
        let services = $app.services.clone();
        test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(JwtService::new(JWT_SECRET, 3600)))
                .configure(|cfg| services.configure(cfg))
                .configure(webhook_config)
                .service(
                    web::scope("/api/v1")
                        .configure(booking_config)
                        .configure(admin_config),
                ),
        )
        .await
    }};
}

fn booking_body(service_id: i64, key: &str) -> Value {
    let starts_at = hours_from_now(48);
    json!({
        "service_id": service_id,
        "starts_at": starts_at,
        "ends_at": starts_at + chrono::Duration::hours(2),
        "details": { "people": 2 },
        "payment_method": "test",
        "payment_token": "tok_ok",
        "idempotency_key": key
    })
}

#[actix_web::test]
async fn test_create_booking_over_http_then_replay() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    let http = init_app!(app);

    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(bearer(CUSTOMER, Role::User))
        .set_json(booking_body(service_id, "web-1"))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["booking"]["total"], 10_000);
    assert_eq!(body["data"]["replayed"], false);
    let booking_id = body["data"]["booking"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(bearer(CUSTOMER, Role::User))
        .set_json(booking_body(service_id, "web-1"))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["replayed"], true);
    assert_eq!(body["data"]["booking"]["id"].as_i64(), Some(booking_id));

    // 其他顾客不能查看
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/bookings/{booking_id}"))
        .insert_header(bearer(CUSTOMER + 1, Role::User))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/bookings/{booking_id}"))
        .insert_header(bearer(PROVIDER, Role::Provider))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_domain_errors_map_to_status_codes() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 1).await;
    let http = init_app!(app);

    let mut body = booking_body(service_id, "too-many");
    body["details"]["people"] = json!(2);
    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(bearer(CUSTOMER, Role::User))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CAPACITY_EXCEEDED");

    let mut body = booking_body(service_id, "declined");
    body["details"]["people"] = json!(1);
    body["payment_token"] = json!("fail");
    let req = test::TestRequest::post()
        .uri("/api/v1/bookings")
        .insert_header(bearer(CUSTOMER, Role::User))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
}

#[actix_web::test]
async fn test_requests_without_token_are_rejected() {
    let app = setup().await;
    let http = init_app!(app);

    let req = test::TestRequest::get().uri("/api/v1/bookings").to_request();
    let err = match test::try_call_service(&http, req).await {
        Ok(resp) => panic!("expected auth error, got {}", resp.status()),
        Err(err) => err,
    };
    assert_eq!(
        err.as_response_error().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_signed_webhook_updates_payment() {
    let app = setup().await;
    let payment = app
        .services
        .payment_service
        .charge(CUSTOMER, Some(PROVIDER), "test", Some("tok_ok".into()), 2_000, "deposit")
        .await
        .unwrap();
    let reference = payment.gateway_reference.clone().unwrap();
    let http = init_app!(app);

    let body = serde_json::to_vec(&json!({
        "type": "charge.refunded",
        "data": { "reference": reference, "failure_reason": null }
    }))
    .unwrap();

    // 篡改签名
    let forged = signature_header("whsec_other", chrono::Utc::now().timestamp(), &body).unwrap();
    let req = test::TestRequest::post()
        .uri("/webhook/payments")
        .insert_header((SIGNATURE_HEADER, forged))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/webhook/payments")
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let signed = signature_header("whsec_test", chrono::Utc::now().timestamp(), &body).unwrap();
    let req = test::TestRequest::post()
        .uri("/webhook/payments")
        .insert_header((SIGNATURE_HEADER, signed))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stored = payments::Entity::find_by_id(payment.id)
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
}

#[actix_web::test]
async fn test_admin_settings_require_admin_and_valid_values() {
    let app = setup().await;
    let settings = app.settings.clone();
    let http = init_app!(app);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/admin/settings/{TAX_RATE}"))
        .insert_header(bearer(CUSTOMER, Role::User))
        .set_json(json!({ "value": "8" }))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/admin/settings/{TAX_RATE}"))
        .insert_header(bearer(1, Role::Admin))
        .set_json(json!({ "value": "not-a-number" }))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/admin/settings/{TAX_RATE}"))
        .insert_header(bearer(1, Role::Admin))
        .set_json(json!({ "value": "8" }))
        .to_request();
    let resp = test::call_service(&http, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        settings.get_setting(TAX_RATE).await.unwrap().as_deref(),
        Some("8")
    );
}
