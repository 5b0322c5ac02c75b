#![allow(dead_code)]

use chrono::{DateTime, Utc};
use marketplace_booking::AppServices;
use marketplace_booking::config::PaymentConfig;
use marketplace_booking::entities::{
    ServiceKind, WalletKind, cancellation_policy_entity as policies,
    cancellation_rule_entity as policy_rules, catering_entity as caterings, event_entity as events,
    restaurant_entity as restaurants, service_entity as services, wallet_entity as wallets,
};
use marketplace_booking::models::{BookingDetailsInput, CreateBookingRequest, Fulfillment};
use marketplace_booking::services::{MemorySettings, SettingsProvider};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use std::sync::Arc;

pub const CUSTOMER: i64 = 100;
pub const PROVIDER: i64 = 200;

pub struct TestApp {
    pub pool: DatabaseConnection,
    pub services: AppServices,
    pub settings: Arc<MemorySettings>,
}

/// 单连接内存库：同一连接上的事务串行执行
pub async fn setup_with(settings: MemorySettings) -> TestApp {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let pool = Database::connect(options).await.unwrap();
    Migrator::up(&pool, None).await.unwrap();

    let payment_config = PaymentConfig {
        allow_test_payments: true,
        webhook_secret: "whsec_test".to_string(),
        ..PaymentConfig::default()
    };
    let settings = Arc::new(settings);
    let provider: Arc<dyn SettingsProvider> = settings.clone();
    let services = AppServices::with_settings(pool.clone(), &payment_config, provider);
    TestApp {
        pool,
        services,
        settings,
    }
}

pub async fn setup() -> TestApp {
    setup_with(MemorySettings::new()).await
}

/// 整点时间，避免 SQLite 文本时间戳比较受小数秒影响
pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
    let now = Utc::now().timestamp();
    DateTime::from_timestamp(now - now % 3600 + 3600 + hours * 3600, 0).unwrap()
}

async fn insert_service(pool: &DatabaseConnection, kind: ServiceKind) -> services::Model {
    let now = hours_from_now(-1);
    services::ActiveModel {
        provider_id: Set(PROVIDER),
        name: Set(format!("{kind} service")),
        kind: Set(kind),
        is_approved: Set(true),
        rating: Set(None),
        opens_at: Set(None),
        closes_at: Set(None),
        max_advance_days: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(pool)
    .await
    .unwrap()
}

pub async fn seed_event(pool: &DatabaseConnection, price: i64, max_individuals: i32) -> i64 {
    let service = insert_service(pool, ServiceKind::Event).await;
    events::ActiveModel {
        service_id: Set(service.id),
        price_per_person: Set(price),
        max_individuals: Set(max_individuals),
    }
    .insert(pool)
    .await
    .unwrap();
    service.id
}

pub async fn seed_catering(pool: &DatabaseConnection, price: i64, stock: i32) -> i64 {
    let service = insert_service(pool, ServiceKind::Catering).await;
    caterings::ActiveModel {
        service_id: Set(service.id),
        price_per_unit: Set(price),
        stock: Set(stock),
        min_order_qty: Set(1),
        allows_delivery: Set(true),
        allows_pickup: Set(true),
        delivery_fee: Set(500),
    }
    .insert(pool)
    .await
    .unwrap();
    service.id
}

pub async fn seed_restaurant(pool: &DatabaseConnection, per_guest: i64, fee: i64) -> i64 {
    let service = insert_service(pool, ServiceKind::Restaurant).await;
    restaurants::ActiveModel {
        service_id: Set(service.id),
        price_per_guest: Set(per_guest),
        reservation_fee: Set(fee),
        max_guests: Set(20),
    }
    .insert(pool)
    .await
    .unwrap();
    service.id
}

/// (hours_before, refund_percent)
pub async fn seed_policy(pool: &DatabaseConnection, service_id: Option<i64>, rules: &[(i32, i32)]) {
    let policy = policies::ActiveModel {
        service_id: Set(service_id),
        name: Set("standard".to_string()),
        created_at: Set(hours_from_now(-1)),
        ..Default::default()
    }
    .insert(pool)
    .await
    .unwrap();
    for (hours_before, refund_percent) in rules {
        policy_rules::ActiveModel {
            policy_id: Set(policy.id),
            hours_before: Set(*hours_before),
            refund_percent: Set(*refund_percent),
            ..Default::default()
        }
        .insert(pool)
        .await
        .unwrap();
    }
}

pub async fn seed_user_wallet(pool: &DatabaseConnection, user_id: i64, balance: i64) {
    wallets::ActiveModel {
        user_id: Set(Some(user_id)),
        kind: Set(WalletKind::User),
        balance: Set(balance),
        updated_at: Set(hours_from_now(-1)),
        ..Default::default()
    }
    .insert(pool)
    .await
    .unwrap();
}

pub async fn system_balance(pool: &DatabaseConnection, kind: WalletKind) -> i64 {
    wallets::Entity::find()
        .filter(wallets::Column::Kind.eq(kind))
        .filter(wallets::Column::UserId.is_null())
        .one(pool)
        .await
        .unwrap()
        .unwrap()
        .balance
}

pub async fn user_balance(pool: &DatabaseConnection, user_id: i64) -> i64 {
    wallets::Entity::find()
        .filter(wallets::Column::UserId.eq(user_id))
        .one(pool)
        .await
        .unwrap()
        .map(|w| w.balance)
        .unwrap_or(0)
}

pub fn event_request(service_id: i64, people: i32, starts_in_hours: i64) -> CreateBookingRequest {
    let starts_at = hours_from_now(starts_in_hours);
    CreateBookingRequest {
        service_id,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(2),
        details: BookingDetailsInput {
            people: Some(people),
            ..Default::default()
        },
        payment_method: "test".to_string(),
        payment_token: Some("tok_ok".to_string()),
        coupon_code: None,
        points_to_use: None,
        idempotency_key: None,
    }
}

pub fn catering_request(service_id: i64, quantity: i32, starts_in_hours: i64) -> CreateBookingRequest {
    let starts_at = hours_from_now(starts_in_hours);
    CreateBookingRequest {
        service_id,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(1),
        details: BookingDetailsInput {
            quantity: Some(quantity),
            fulfillment: Some(Fulfillment::Pickup),
            ..Default::default()
        },
        payment_method: "test".to_string(),
        payment_token: Some("tok_ok".to_string()),
        coupon_code: None,
        points_to_use: None,
        idempotency_key: None,
    }
}
