mod common;

use common::*;
use marketplace_booking::entities::{
    PaymentStatus, booking_entity as bookings, catering_entity as caterings,
    invoice_entity as invoices, order_entity as orders, payment_transaction_entity as payments,
};
use marketplace_booking::error::AppError;
use marketplace_booking::models::{BulkCateringItem, CreateBulkCateringRequest, Fulfillment};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

async fn stock_of(pool: &DatabaseConnection, service_id: i64) -> i32 {
    caterings::Entity::find_by_id(service_id)
        .one(pool)
        .await
        .unwrap()
        .unwrap()
        .stock
}

fn bulk_item(service_id: i64, quantity: i32, starts_in_hours: i64) -> BulkCateringItem {
    let starts_at = hours_from_now(starts_in_hours);
    BulkCateringItem {
        service_id,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(1),
        quantity,
        addon_ids: Vec::new(),
        fulfillment: Fulfillment::Pickup,
        delivery_address: None,
    }
}

fn bulk_request(items: Vec<BulkCateringItem>) -> CreateBulkCateringRequest {
    CreateBulkCateringRequest {
        provider_id: PROVIDER,
        items,
        payment_method: "test".to_string(),
        payment_token: Some("tok_ok".to_string()),
        idempotency_key: None,
    }
}

#[actix_web::test]
async fn test_concurrent_orders_cannot_oversell_stock() {
    let app = setup().await;
    let service_id = seed_catering(&app.pool, 1_000, 10).await;
    let booking_service = &app.services.booking_service;

    let (first, second) = futures_util::future::join(
        booking_service.create_booking(CUSTOMER, catering_request(service_id, 10, 48)),
        booking_service.create_booking(CUSTOMER + 1, catering_request(service_id, 10, 48)),
    )
    .await;

    let results = [first, second];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(AppError::StockExceeded(_))))
    );
    assert_eq!(stock_of(&app.pool, service_id).await, 0);
    assert_eq!(bookings::Entity::find().count(&app.pool).await.unwrap(), 1);

    // 失败一方的扣款被退回
    let refunded = payments::Entity::find()
        .all(&app.pool)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Refunded)
        .count();
    assert_eq!(refunded, 1);
}

#[actix_web::test]
async fn test_delivery_fee_is_charged_once_per_order() {
    let app = setup().await;
    let service_id = seed_catering(&app.pool, 1_000, 10).await;

    let mut req = catering_request(service_id, 3, 48);
    req.details.fulfillment = Some(Fulfillment::Delivery);
    req.details.delivery_address = Some("1 Market St".to_string());
    let outcome = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap();

    assert_eq!(outcome.booking.subtotal, 3_500);
    assert_eq!(stock_of(&app.pool, service_id).await, 7);
}

#[actix_web::test]
async fn test_bulk_order_shares_one_order_and_payment() {
    let app = setup().await;
    let lunch = seed_catering(&app.pool, 1_000, 10).await;
    let dinner = seed_catering(&app.pool, 2_000, 5).await;

    let outcome = app
        .services
        .booking_service
        .create_bulk_catering_booking(
            CUSTOMER,
            bulk_request(vec![
                bulk_item(lunch, 4, 48),
                bulk_item(lunch, 4, 72),
                bulk_item(dinner, 2, 48),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.bookings.len(), 3);
    assert_eq!(outcome.total, 12_000);
    assert!(
        outcome
            .bookings
            .iter()
            .all(|b| b.order_id == outcome.order_id)
    );
    assert_eq!(orders::Entity::find().count(&app.pool).await.unwrap(), 1);
    assert_eq!(invoices::Entity::find().count(&app.pool).await.unwrap(), 1);

    let payment = payments::Entity::find().one(&app.pool).await.unwrap().unwrap();
    assert_eq!(payment.amount, 12_000);
    assert_eq!(payment.booking_id, None);
    assert_eq!(payment.order_id, outcome.order_id);

    assert_eq!(stock_of(&app.pool, lunch).await, 2);
    assert_eq!(stock_of(&app.pool, dinner).await, 3);
}

#[actix_web::test]
async fn test_bulk_order_checks_running_stock_before_charging() {
    let app = setup().await;
    let lunch = seed_catering(&app.pool, 1_000, 10).await;

    let err = app
        .services
        .booking_service
        .create_bulk_catering_booking(
            CUSTOMER,
            bulk_request(vec![
                bulk_item(lunch, 4, 48),
                bulk_item(lunch, 4, 72),
                bulk_item(lunch, 3, 96),
            ]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StockExceeded(_)));
    assert_eq!(stock_of(&app.pool, lunch).await, 10);
    assert_eq!(payments::Entity::find().count(&app.pool).await.unwrap(), 0);
}

#[actix_web::test]
async fn test_bulk_order_rejects_other_providers_services() {
    let app = setup().await;
    let lunch = seed_catering(&app.pool, 1_000, 10).await;

    let mut req = bulk_request(vec![bulk_item(lunch, 1, 48)]);
    req.provider_id = PROVIDER + 1;
    let err = app
        .services
        .booking_service
        .create_bulk_catering_booking(CUSTOMER, req)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = app
        .services
        .booking_service
        .create_bulk_catering_booking(CUSTOMER, bulk_request(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[actix_web::test]
async fn test_bulk_order_replays_by_idempotency_key() {
    let app = setup().await;
    let lunch = seed_catering(&app.pool, 1_000, 10).await;

    let mut req = bulk_request(vec![bulk_item(lunch, 2, 48), bulk_item(lunch, 2, 72)]);
    req.idempotency_key = Some("party-42".to_string());

    let first = app
        .services
        .booking_service
        .create_bulk_catering_booking(CUSTOMER, req.clone())
        .await
        .unwrap();
    let second = app
        .services
        .booking_service
        .create_bulk_catering_booking(CUSTOMER, req)
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(second.bookings.len(), 2);
    assert_eq!(
        first.bookings[1].idempotency_key.as_deref(),
        Some("party-42-1")
    );
    assert_eq!(stock_of(&app.pool, lunch).await, 6);
    assert_eq!(payments::Entity::find().count(&app.pool).await.unwrap(), 1);
}
