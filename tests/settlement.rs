mod common;

use common::*;
use marketplace_booking::entities::{
    BookingStatus, PaymentStatus, SettlementStatus, WalletKind, booking_entity as bookings,
    order_entity as orders, payment_transaction_entity as payments,
};
use marketplace_booking::error::AppError;
use marketplace_booking::services::BookingOutcome;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};

async fn book_event(app: &TestApp, people: i32, starts_in_hours: i64) -> BookingOutcome {
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    app.services
        .booking_service
        .create_booking(CUSTOMER, event_request(service_id, people, starts_in_hours))
        .await
        .unwrap()
}

async fn move_to_past(app: &TestApp, booking_id: i64) {
    let booking = bookings::Entity::find_by_id(booking_id)
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    let mut am = booking.into_active_model();
    am.starts_at = Set(hours_from_now(-5));
    am.ends_at = Set(hours_from_now(-3));
    am.update(&app.pool).await.unwrap();
}

async fn payment_of(app: &TestApp, outcome: &BookingOutcome) -> payments::Model {
    payments::Entity::find_by_id(outcome.payment_transaction_id.unwrap())
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap()
}

// -----------------------------
// 托管结算
// -----------------------------

#[actix_web::test]
async fn test_partial_settlement_must_cover_held_amount() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 48).await;
    let payment_id = outcome.payment_transaction_id.unwrap();
    let escrow = &app.services.escrow_service;

    let err = escrow.partial_settle(payment_id, 5_000, 5_000).await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    let settled = escrow.partial_settle(payment_id, 6_000, 3_000).await.unwrap();
    assert_eq!(
        settled.settlement_status,
        Some(SettlementStatus::PartiallyReleased)
    );
    assert_eq!(user_balance(&app.pool, PROVIDER).await, 6_000);
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 0);

    // 已结算的托管不能再次释放
    let err = escrow.release_to_provider(payment_id).await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}

#[actix_web::test]
async fn test_full_refund_returns_platform_cut() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 48).await;

    let refunded = app
        .services
        .escrow_service
        .refund_to_customer(outcome.payment_transaction_id.unwrap())
        .await
        .unwrap();

    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.settlement_status, Some(SettlementStatus::Refunded));
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 0);
    assert_eq!(system_balance(&app.pool, WalletKind::Admin).await, 0);
}

#[actix_web::test]
async fn test_completion_releases_escrow_and_awards_points() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 48).await;
    let booking_id = outcome.booking.id;

    let err = app
        .services
        .booking_service
        .complete_booking(PROVIDER, booking_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    move_to_past(&app, booking_id).await;

    let err = app
        .services
        .booking_service
        .complete_booking(CUSTOMER, booking_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let completed = app
        .services
        .booking_service
        .complete_booking(PROVIDER, booking_id)
        .await
        .unwrap();
    assert_eq!(completed.booking.status, BookingStatus::Completed);
    assert_eq!(completed.released_amount, 9_000);
    assert_eq!(completed.points_earned, 100);

    assert_eq!(user_balance(&app.pool, PROVIDER).await, 9_000);
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 0);
    assert_eq!(
        app.services.points_service.balance(CUSTOMER).await.unwrap(),
        100
    );

    let payment = payment_of(&app, &outcome).await;
    assert_eq!(payment.settlement_status, Some(SettlementStatus::Released));
    let order = orders::Entity::find_by_id(outcome.order_id.unwrap())
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "completed");

    let err = app
        .services
        .booking_service
        .complete_booking(PROVIDER, booking_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}

// -----------------------------
// 取消
// -----------------------------

#[actix_web::test]
async fn test_cancellation_refunds_by_policy_tier() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 216).await;
    seed_policy(&app.pool, None, &[(24, 0), (168, 50)]).await;

    let quote = app
        .services
        .cancellation_service
        .compute_refund(&outcome.booking, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(quote.refund_percent, 50);
    assert_eq!(quote.refund_amount, 5_000);

    let cancelled = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.quote.refund_amount, 5_000);

    // 平台保留抽成，剩余归服务方
    assert_eq!(user_balance(&app.pool, PROVIDER).await, 4_000);
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 0);
    assert_eq!(system_balance(&app.pool, WalletKind::Admin).await, 1_000);

    let payment = payment_of(&app, &outcome).await;
    assert_eq!(
        payment.settlement_status,
        Some(SettlementStatus::PartiallyReleased)
    );

    let err = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}

#[actix_web::test]
async fn test_service_policy_overrides_platform_default() {
    let app = setup().await;
    let outcome = book_event(&app, 1, 48).await;
    seed_policy(&app.pool, None, &[(0, 100)]).await;
    seed_policy(&app.pool, Some(outcome.booking.service_id), &[(72, 100), (24, 25)]).await;

    let quote = app
        .services
        .cancellation_service
        .compute_refund(&outcome.booking, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(quote.refund_percent, 25);
    assert_eq!(quote.refund_amount, 1_250);
}

#[actix_web::test]
async fn test_cancellation_without_policy_refunds_nothing() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 48).await;

    let cancelled = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.quote.refund_percent, 0);
    assert_eq!(cancelled.quote.refund_amount, 0);
    assert_eq!(user_balance(&app.pool, PROVIDER).await, 9_000);
}

#[actix_web::test]
async fn test_wallet_refund_lands_in_customer_wallet() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    seed_user_wallet(&app.pool, CUSTOMER, 20_000).await;
    seed_policy(&app.pool, None, &[(0, 100)]).await;

    let mut req = event_request(service_id, 2, 48);
    req.payment_method = "wallet".to_string();
    let outcome = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap();
    assert_eq!(user_balance(&app.pool, CUSTOMER).await, 10_000);

    let cancelled = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.quote.refund_amount, 10_000);
    assert_eq!(user_balance(&app.pool, CUSTOMER).await, 20_000);
    assert_eq!(system_balance(&app.pool, WalletKind::Admin).await, 0);
}

#[actix_web::test]
async fn test_full_policy_refund_includes_platform_cut() {
    let app = setup().await;
    let outcome = book_event(&app, 2, 48).await;
    seed_policy(&app.pool, None, &[(0, 100)]).await;

    let quote = app
        .services
        .cancellation_service
        .compute_refund(&outcome.booking, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(quote.refund_amount, 10_000);

    let cancelled = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.quote.refund_amount, quote.refund_amount);

    assert_eq!(user_balance(&app.pool, PROVIDER).await, 0);
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 0);
    assert_eq!(system_balance(&app.pool, WalletKind::Admin).await, 0);

    let payment = payment_of(&app, &outcome).await;
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.settlement_status, Some(SettlementStatus::Refunded));
}

#[actix_web::test]
async fn test_cancellation_restores_stock_and_points() {
    let app = setup().await;
    let service_id = seed_catering(&app.pool, 1_000, 10).await;
    app.services
        .points_service
        .earn(CUSTOMER, 1_000, None)
        .await
        .unwrap();

    let mut req = catering_request(service_id, 4, 48);
    req.points_to_use = Some(500);
    let outcome = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap();
    assert_eq!(
        app.services.points_service.balance(CUSTOMER).await.unwrap(),
        500
    );

    let cancelled = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.points_restored, 500);
    assert_eq!(
        app.services.points_service.balance(CUSTOMER).await.unwrap(),
        1_000
    );

    let catering = marketplace_booking::entities::catering_entity::Entity::find_by_id(service_id)
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(catering.stock, 10);
}

#[actix_web::test]
async fn test_only_the_customer_can_cancel() {
    let app = setup().await;
    let outcome = book_event(&app, 1, 48).await;

    let err = app
        .services
        .cancellation_service
        .cancel_booking(PROVIDER, outcome.booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[actix_web::test]
async fn test_bulk_order_bookings_cannot_be_cancelled_individually() {
    let app = setup().await;
    let lunch = seed_catering(&app.pool, 1_000, 10).await;
    let starts_at = hours_from_now(48);
    let item = marketplace_booking::models::BulkCateringItem {
        service_id: lunch,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(1),
        quantity: 2,
        addon_ids: Vec::new(),
        fulfillment: marketplace_booking::models::Fulfillment::Pickup,
        delivery_address: None,
    };
    let outcome = app
        .services
        .booking_service
        .create_bulk_catering_booking(
            CUSTOMER,
            marketplace_booking::models::CreateBulkCateringRequest {
                provider_id: PROVIDER,
                items: vec![item.clone(), item],
                payment_method: "test".to_string(),
                payment_token: Some("tok_ok".to_string()),
                idempotency_key: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .services
        .cancellation_service
        .cancel_booking(CUSTOMER, outcome.bookings[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));
}
