mod common;

use common::*;
use marketplace_booking::entities::{
    DiscountType, LedgerEntryType, WalletKind, coupon_entity as coupons,
    coupon_redemption_entity as redemptions, points_ledger_entity as ledger,
};
use marketplace_booking::error::AppError;
use marketplace_booking::models::PaginationParams;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

#[actix_web::test]
async fn test_earn_then_spend_leaves_remainder() {
    let app = setup().await;
    let points = &app.services.points_service;

    points.earn(CUSTOMER, 100, Some(hours_from_now(24 * 30))).await.unwrap();
    let spent = points.spend(CUSTOMER, 40).await.unwrap();

    assert_eq!(spent.len(), 1);
    assert_eq!(spent[0].entry_type, LedgerEntryType::Spend);
    assert_eq!(spent[0].points, 40);
    assert_eq!(points.balance(CUSTOMER).await.unwrap(), 60);

    let history = points
        .history(CUSTOMER, PaginationParams::new(None, None))
        .await
        .unwrap();
    assert_eq!(history.total, 2);
}

#[actix_web::test]
async fn test_spend_uses_earliest_expiring_lot_first() {
    let app = setup().await;
    let points = &app.services.points_service;

    let late = points.earn(CUSTOMER, 50, Some(hours_from_now(24 * 60))).await.unwrap();
    let early = points.earn(CUSTOMER, 30, Some(hours_from_now(24 * 10))).await.unwrap();
    let spent = points.spend(CUSTOMER, 40).await.unwrap();

    assert_eq!(spent.len(), 2);
    assert_eq!(spent[0].source_entry_id, Some(early.id));
    assert_eq!(spent[0].points, 30);
    assert_eq!(spent[1].source_entry_id, Some(late.id));
    assert_eq!(spent[1].points, 10);
}

#[actix_web::test]
async fn test_overspending_is_rejected() {
    let app = setup().await;
    let points = &app.services.points_service;
    points.earn(CUSTOMER, 10, None).await.unwrap();

    let err = points.spend(CUSTOMER, 11).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientPoints {
            requested: 11,
            available: 10
        }
    ));
}

#[actix_web::test]
async fn test_expired_points_are_written_off_once() {
    let app = setup().await;
    let points = &app.services.points_service;

    points.earn(CUSTOMER, 100, None).await.unwrap();
    points.earn(CUSTOMER, 50, Some(hours_from_now(-3))).await.unwrap();
    assert_eq!(points.balance(CUSTOMER).await.unwrap(), 100);

    let now = hours_from_now(-1);
    let summary = points.expire_due(now).await.unwrap();
    assert_eq!(summary.entries, 1);
    assert_eq!(summary.points, 50);

    let again = points.expire_due(now).await.unwrap();
    assert_eq!(again.entries, 0);
    assert_eq!(points.balance(CUSTOMER).await.unwrap(), 100);

    let expired = ledger::Entity::find()
        .filter(ledger::Column::EntryType.eq(LedgerEntryType::Expire))
        .count(&app.pool)
        .await
        .unwrap();
    assert_eq!(expired, 1);
}

#[actix_web::test]
async fn test_points_redemption_is_capped_by_ratio() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    app.services
        .points_service
        .earn(CUSTOMER, 5_000, None)
        .await
        .unwrap();

    let mut req = event_request(service_id, 1, 48);
    req.points_to_use = Some(3_000);
    let outcome = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap();

    // 默认最多抵扣 50%
    assert_eq!(outcome.booking.points_used, 2_500);
    assert_eq!(outcome.booking.points_value, 2_500);
    assert_eq!(outcome.booking.total, 2_500);
    assert_eq!(
        app.services.points_service.balance(CUSTOMER).await.unwrap(),
        2_500
    );

    // 实付低于服务方应得，平台不再抽成
    assert_eq!(system_balance(&app.pool, WalletKind::Escrow).await, 2_500);
    assert_eq!(system_balance(&app.pool, WalletKind::Admin).await, 0);
}

#[actix_web::test]
async fn test_requesting_more_points_than_balance_fails_before_charge() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    app.services
        .points_service
        .earn(CUSTOMER, 100, None)
        .await
        .unwrap();

    let mut req = event_request(service_id, 1, 48);
    req.points_to_use = Some(500);
    let err = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientPoints { .. }));
}

async fn seed_coupon(app: &TestApp, code: &str, per_user_limit: Option<i32>) -> coupons::Model {
    coupons::ActiveModel {
        code: Set(code.to_string()),
        discount_type: Set(DiscountType::Percentage),
        discount_value: Set(1_000),
        min_subtotal: Set(0),
        max_discount: Set(None),
        usage_limit: Set(None),
        per_user_limit: Set(per_user_limit),
        used_count: Set(0),
        service_id: Set(None),
        provider_id: Set(None),
        starts_at: Set(None),
        expires_at: Set(None),
        is_active: Set(true),
        created_at: Set(hours_from_now(-1)),
        ..Default::default()
    }
    .insert(&app.pool)
    .await
    .unwrap()
}

#[actix_web::test]
async fn test_coupon_is_redeemed_with_booking() {
    let app = setup().await;
    let service_id = seed_event(&app.pool, 5_000, 10).await;
    let coupon = seed_coupon(&app, "SAVE10", Some(1)).await;

    let quote = app
        .services
        .coupon_service
        .validate_for_service(CUSTOMER, service_id, " save10 ", 10_000)
        .await
        .unwrap();
    assert_eq!(quote.discount, 1_000);

    let mut req = event_request(service_id, 2, 48);
    req.coupon_code = Some("save10".to_string());
    let outcome = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req.clone())
        .await
        .unwrap();
    assert_eq!(outcome.booking.discount, 1_000);
    assert_eq!(outcome.booking.total, 9_000);

    let stored = coupons::Entity::find_by_id(coupon.id)
        .one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 1);
    let redemption = redemptions::Entity::find().one(&app.pool).await.unwrap().unwrap();
    assert_eq!(redemption.booking_id, Some(outcome.booking.id));
    assert_eq!(redemption.discount_amount, 1_000);

    // 每人限用一次
    let err = app
        .services
        .booking_service
        .create_booking(CUSTOMER, req)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}
