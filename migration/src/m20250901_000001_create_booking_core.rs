use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

#[derive(DeriveIden)]
enum Settings {
    Table,
    Key,
    Value,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CacheVersions {
    Table,
    Name,
    Version,
}

#[derive(DeriveIden)]
enum Services {
    Table,
    Id,
    ProviderId,
    Name,
    Kind,
    IsApproved,
    Rating,
    OpensAt,
    ClosesAt,
    MaxAdvanceDays,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    ServiceId,
    PricePerPerson,
    MaxIndividuals,
}

#[derive(DeriveIden)]
enum Caterings {
    Table,
    ServiceId,
    PricePerUnit,
    Stock,
    MinOrderQty,
    AllowsDelivery,
    AllowsPickup,
    DeliveryFee,
}

#[derive(DeriveIden)]
enum CateringAddons {
    Table,
    Id,
    ServiceId,
    Name,
    Price,
}

#[derive(DeriveIden)]
enum Restaurants {
    Table,
    ServiceId,
    PricePerGuest,
    ReservationFee,
    MaxGuests,
}

#[derive(DeriveIden)]
enum Properties {
    Table,
    ServiceId,
    NightlyRate,
    CleaningFee,
    MaxAdults,
    MaxChildren,
}

#[derive(DeriveIden)]
enum ServiceBlocks {
    Table,
    Id,
    ServiceId,
    StartsAt,
    EndsAt,
    Reason,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    UserId,
    ProviderId,
    OrderNumber,
    Subtotal,
    Tax,
    Discount,
    Total,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
    OrderId,
    InvoiceNumber,
    Subtotal,
    Tax,
    Discount,
    PointsValue,
    Total,
    CommissionAmount,
    ProviderAmount,
    PlatformAmount,
    Breakdown,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Bookings {
    Table,
    Id,
    UserId,
    ServiceId,
    ProviderId,
    OrderId,
    Reference,
    StartsAt,
    EndsAt,
    Units,
    BookingDetails,
    Subtotal,
    Tax,
    Discount,
    PointsUsed,
    PointsValue,
    Total,
    Status,
    PaymentMethod,
    CouponCode,
    IdempotencyKey,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PaymentTransactions {
    Table,
    Id,
    UserId,
    BookingId,
    OrderId,
    ProviderId,
    Method,
    GatewayReference,
    Amount,
    Currency,
    Status,
    SettlementStatus,
    HeldAmount,
    PlatformFee,
    FailureReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PointsLedger {
    Table,
    Id,
    UserId,
    EntryType,
    Points,
    ExpiresAt,
    SourceEntryId,
    BookingId,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    DiscountType,
    DiscountValue,
    MinSubtotal,
    MaxDiscount,
    UsageLimit,
    PerUserLimit,
    UsedCount,
    ServiceId,
    ProviderId,
    StartsAt,
    ExpiresAt,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CouponRedemptions {
    Table,
    Id,
    CouponId,
    UserId,
    BookingId,
    OrderId,
    DiscountAmount,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CancellationPolicies {
    Table,
    Id,
    ServiceId,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CancellationPolicyRules {
    Table,
    Id,
    PolicyId,
    HoursBefore,
    RefundPercent,
}

#[derive(DeriveIden)]
enum CommissionRules {
    Table,
    Id,
    RuleType,
    ServiceKind,
    Threshold,
    RateBp,
    MinAmount,
    MaxAmount,
    IsActive,
}

#[derive(DeriveIden)]
enum Wallets {
    Table,
    Id,
    UserId,
    Kind,
    Balance,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WalletTransactions {
    Table,
    Id,
    WalletId,
    Amount,
    BalanceAfter,
    ReferenceType,
    ReferenceId,
    Description,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ScheduledJobs {
    Table,
    Id,
    JobType,
    Payload,
    RunAt,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    UserId,
    Title,
    Body,
    Data,
    IsRead,
    CreatedAt,
}

/// SQLite only accepts AUTOINCREMENT on an `integer` primary key; its
/// integers are 64-bit so the entities still map to `i64`.
fn id_col<T: IntoIden>(backend: DatabaseBackend, col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Sqlite => def.integer(),
        _ => def.big_integer(),
    };
    def.not_null().auto_increment().primary_key();
    def
}

fn money<T: IntoIden>(col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    def.big_integer().not_null().default(0);
    def
}

fn timestamp<T: IntoIden>(col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    def.timestamp_with_time_zone().not_null();
    def
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Settings::Key).string_len(100).not_null().primary_key())
                    .col(ColumnDef::new(Settings::Value).text().not_null())
                    .col(&mut timestamp(Settings::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CacheVersions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CacheVersions::Name).string_len(50).not_null().primary_key())
                    .col(ColumnDef::new(CacheVersions::Version).big_integer().not_null().default(0))
                    .to_owned(),
            )
            .await?;

        // 服务主表及其四种子类型
        manager
            .create_table(
                Table::create()
                    .table(Services::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Services::Id))
                    .col(ColumnDef::new(Services::ProviderId).big_integer().not_null())
                    .col(ColumnDef::new(Services::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Services::Kind).string_len(20).not_null())
                    .col(ColumnDef::new(Services::IsApproved).boolean().not_null().default(false))
                    .col(ColumnDef::new(Services::Rating).double().null())
                    .col(ColumnDef::new(Services::OpensAt).time().null())
                    .col(ColumnDef::new(Services::ClosesAt).time().null())
                    .col(ColumnDef::new(Services::MaxAdvanceDays).integer().null())
                    .col(&mut timestamp(Services::CreatedAt))
                    .col(&mut timestamp(Services::UpdatedAt))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_services_provider_id")
                    .table(Services::Table)
                    .col(Services::ProviderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::ServiceId).big_integer().not_null().primary_key())
                    .col(&mut money(Events::PricePerPerson))
                    .col(ColumnDef::new(Events::MaxIndividuals).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_service")
                            .from(Events::Table, Events::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Caterings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Caterings::ServiceId).big_integer().not_null().primary_key())
                    .col(&mut money(Caterings::PricePerUnit))
                    .col(ColumnDef::new(Caterings::Stock).integer().not_null().default(0))
                    .col(ColumnDef::new(Caterings::MinOrderQty).integer().not_null().default(1))
                    .col(ColumnDef::new(Caterings::AllowsDelivery).boolean().not_null().default(true))
                    .col(ColumnDef::new(Caterings::AllowsPickup).boolean().not_null().default(true))
                    .col(&mut money(Caterings::DeliveryFee))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_caterings_service")
                            .from(Caterings::Table, Caterings::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CateringAddons::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, CateringAddons::Id))
                    .col(ColumnDef::new(CateringAddons::ServiceId).big_integer().not_null())
                    .col(ColumnDef::new(CateringAddons::Name).string_len(255).not_null())
                    .col(&mut money(CateringAddons::Price))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Restaurants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Restaurants::ServiceId).big_integer().not_null().primary_key())
                    .col(&mut money(Restaurants::PricePerGuest))
                    .col(&mut money(Restaurants::ReservationFee))
                    .col(ColumnDef::new(Restaurants::MaxGuests).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_restaurants_service")
                            .from(Restaurants::Table, Restaurants::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Properties::ServiceId).big_integer().not_null().primary_key())
                    .col(&mut money(Properties::NightlyRate))
                    .col(&mut money(Properties::CleaningFee))
                    .col(ColumnDef::new(Properties::MaxAdults).integer().not_null())
                    .col(ColumnDef::new(Properties::MaxChildren).integer().not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_properties_service")
                            .from(Properties::Table, Properties::ServiceId)
                            .to(Services::Table, Services::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ServiceBlocks::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, ServiceBlocks::Id))
                    .col(ColumnDef::new(ServiceBlocks::ServiceId).big_integer().not_null())
                    .col(&mut timestamp(ServiceBlocks::StartsAt))
                    .col(&mut timestamp(ServiceBlocks::EndsAt))
                    .col(ColumnDef::new(ServiceBlocks::Reason).string_len(255).null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_service_blocks_service_id")
                    .table(ServiceBlocks::Table)
                    .col(ServiceBlocks::ServiceId)
                    .to_owned(),
            )
            .await?;

        // 订单 / 发票
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Orders::Id))
                    .col(ColumnDef::new(Orders::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::ProviderId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::OrderNumber).string_len(40).not_null().unique_key())
                    .col(&mut money(Orders::Subtotal))
                    .col(&mut money(Orders::Tax))
                    .col(&mut money(Orders::Discount))
                    .col(&mut money(Orders::Total))
                    .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                    .col(&mut timestamp(Orders::CreatedAt))
                    .col(&mut timestamp(Orders::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Invoices::Id))
                    .col(ColumnDef::new(Invoices::OrderId).big_integer().not_null().unique_key())
                    .col(ColumnDef::new(Invoices::InvoiceNumber).string_len(40).not_null().unique_key())
                    .col(&mut money(Invoices::Subtotal))
                    .col(&mut money(Invoices::Tax))
                    .col(&mut money(Invoices::Discount))
                    .col(&mut money(Invoices::PointsValue))
                    .col(&mut money(Invoices::Total))
                    .col(&mut money(Invoices::CommissionAmount))
                    .col(&mut money(Invoices::ProviderAmount))
                    .col(&mut money(Invoices::PlatformAmount))
                    .col(ColumnDef::new(Invoices::Breakdown).json().not_null())
                    .col(&mut timestamp(Invoices::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoices_order")
                            .from(Invoices::Table, Invoices::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Bookings::Id))
                    .col(ColumnDef::new(Bookings::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Bookings::ServiceId).big_integer().not_null())
                    .col(ColumnDef::new(Bookings::ProviderId).big_integer().not_null())
                    .col(ColumnDef::new(Bookings::OrderId).big_integer().null())
                    .col(ColumnDef::new(Bookings::Reference).string_len(40).not_null().unique_key())
                    .col(&mut timestamp(Bookings::StartsAt))
                    .col(&mut timestamp(Bookings::EndsAt))
                    .col(ColumnDef::new(Bookings::Units).integer().not_null())
                    .col(ColumnDef::new(Bookings::BookingDetails).json().not_null())
                    .col(&mut money(Bookings::Subtotal))
                    .col(&mut money(Bookings::Tax))
                    .col(&mut money(Bookings::Discount))
                    .col(&mut money(Bookings::PointsUsed))
                    .col(&mut money(Bookings::PointsValue))
                    .col(&mut money(Bookings::Total))
                    .col(ColumnDef::new(Bookings::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Bookings::PaymentMethod).string_len(20).not_null())
                    .col(ColumnDef::new(Bookings::CouponCode).string_len(50).null())
                    .col(ColumnDef::new(Bookings::IdempotencyKey).string_len(120).null())
                    .col(&mut timestamp(Bookings::CreatedAt))
                    .col(&mut timestamp(Bookings::UpdatedAt))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_bookings_user_idempotency_key")
                    .table(Bookings::Table)
                    .col(Bookings::UserId)
                    .col(Bookings::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bookings_service_window")
                    .table(Bookings::Table)
                    .col(Bookings::ServiceId)
                    .col(Bookings::StartsAt)
                    .col(Bookings::EndsAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bookings_provider_id")
                    .table(Bookings::Table)
                    .col(Bookings::ProviderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentTransactions::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, PaymentTransactions::Id))
                    .col(ColumnDef::new(PaymentTransactions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(PaymentTransactions::BookingId).big_integer().null())
                    .col(ColumnDef::new(PaymentTransactions::OrderId).big_integer().null())
                    .col(ColumnDef::new(PaymentTransactions::ProviderId).big_integer().null())
                    .col(ColumnDef::new(PaymentTransactions::Method).string_len(20).not_null())
                    .col(
                        ColumnDef::new(PaymentTransactions::GatewayReference)
                            .string_len(255)
                            .null()
                            .unique_key(),
                    )
                    .col(&mut money(PaymentTransactions::Amount))
                    .col(ColumnDef::new(PaymentTransactions::Currency).string_len(10).not_null())
                    .col(ColumnDef::new(PaymentTransactions::Status).string_len(20).not_null())
                    .col(ColumnDef::new(PaymentTransactions::SettlementStatus).string_len(30).null())
                    .col(&mut money(PaymentTransactions::HeldAmount))
                    .col(&mut money(PaymentTransactions::PlatformFee))
                    .col(ColumnDef::new(PaymentTransactions::FailureReason).text().null())
                    .col(&mut timestamp(PaymentTransactions::CreatedAt))
                    .col(&mut timestamp(PaymentTransactions::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // 积分流水（只追加）
        manager
            .create_table(
                Table::create()
                    .table(PointsLedger::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, PointsLedger::Id))
                    .col(ColumnDef::new(PointsLedger::UserId).big_integer().not_null())
                    .col(ColumnDef::new(PointsLedger::EntryType).string_len(10).not_null())
                    .col(ColumnDef::new(PointsLedger::Points).big_integer().not_null())
                    .col(ColumnDef::new(PointsLedger::ExpiresAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(PointsLedger::SourceEntryId).big_integer().null())
                    .col(ColumnDef::new(PointsLedger::BookingId).big_integer().null())
                    .col(ColumnDef::new(PointsLedger::Metadata).json().null())
                    .col(&mut timestamp(PointsLedger::CreatedAt))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_points_ledger_user_id")
                    .table(PointsLedger::Table)
                    .col(PointsLedger::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Coupons::Id))
                    .col(ColumnDef::new(Coupons::Code).string_len(50).not_null().unique_key())
                    .col(ColumnDef::new(Coupons::DiscountType).string_len(20).not_null())
                    .col(ColumnDef::new(Coupons::DiscountValue).big_integer().not_null())
                    .col(&mut money(Coupons::MinSubtotal))
                    .col(ColumnDef::new(Coupons::MaxDiscount).big_integer().null())
                    .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                    .col(ColumnDef::new(Coupons::PerUserLimit).integer().null())
                    .col(ColumnDef::new(Coupons::UsedCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Coupons::ServiceId).big_integer().null())
                    .col(ColumnDef::new(Coupons::ProviderId).big_integer().null())
                    .col(ColumnDef::new(Coupons::StartsAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Coupons::ExpiresAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Coupons::IsActive).boolean().not_null().default(true))
                    .col(&mut timestamp(Coupons::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CouponRedemptions::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, CouponRedemptions::Id))
                    .col(ColumnDef::new(CouponRedemptions::CouponId).big_integer().not_null())
                    .col(ColumnDef::new(CouponRedemptions::UserId).big_integer().not_null())
                    .col(ColumnDef::new(CouponRedemptions::BookingId).big_integer().null())
                    .col(ColumnDef::new(CouponRedemptions::OrderId).big_integer().null())
                    .col(&mut money(CouponRedemptions::DiscountAmount))
                    .col(&mut timestamp(CouponRedemptions::CreatedAt))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_coupon_redemptions_coupon_user")
                    .table(CouponRedemptions::Table)
                    .col(CouponRedemptions::CouponId)
                    .col(CouponRedemptions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CancellationPolicies::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, CancellationPolicies::Id))
                    .col(ColumnDef::new(CancellationPolicies::ServiceId).big_integer().null())
                    .col(ColumnDef::new(CancellationPolicies::Name).string_len(100).not_null())
                    .col(&mut timestamp(CancellationPolicies::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CancellationPolicyRules::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, CancellationPolicyRules::Id))
                    .col(ColumnDef::new(CancellationPolicyRules::PolicyId).big_integer().not_null())
                    .col(ColumnDef::new(CancellationPolicyRules::HoursBefore).integer().not_null())
                    .col(ColumnDef::new(CancellationPolicyRules::RefundPercent).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommissionRules::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, CommissionRules::Id))
                    .col(ColumnDef::new(CommissionRules::RuleType).string_len(20).not_null())
                    .col(ColumnDef::new(CommissionRules::ServiceKind).string_len(20).null())
                    .col(ColumnDef::new(CommissionRules::Threshold).big_integer().not_null().default(0))
                    .col(ColumnDef::new(CommissionRules::RateBp).big_integer().not_null())
                    .col(ColumnDef::new(CommissionRules::MinAmount).big_integer().null())
                    .col(ColumnDef::new(CommissionRules::MaxAmount).big_integer().null())
                    .col(ColumnDef::new(CommissionRules::IsActive).boolean().not_null().default(true))
                    .to_owned(),
            )
            .await?;

        // 钱包（用户钱包 + clearing / escrow / admin 系统钱包）
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Wallets::Id))
                    .col(ColumnDef::new(Wallets::UserId).big_integer().null().unique_key())
                    .col(ColumnDef::new(Wallets::Kind).string_len(20).not_null())
                    .col(&mut money(Wallets::Balance))
                    .col(&mut timestamp(Wallets::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WalletTransactions::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, WalletTransactions::Id))
                    .col(ColumnDef::new(WalletTransactions::WalletId).big_integer().not_null())
                    .col(ColumnDef::new(WalletTransactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(WalletTransactions::BalanceAfter).big_integer().not_null())
                    .col(ColumnDef::new(WalletTransactions::ReferenceType).string_len(40).not_null())
                    .col(ColumnDef::new(WalletTransactions::ReferenceId).big_integer().null())
                    .col(ColumnDef::new(WalletTransactions::Description).text().null())
                    .col(&mut timestamp(WalletTransactions::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScheduledJobs::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, ScheduledJobs::Id))
                    .col(ColumnDef::new(ScheduledJobs::JobType).string_len(50).not_null())
                    .col(ColumnDef::new(ScheduledJobs::Payload).json().not_null())
                    .col(&mut timestamp(ScheduledJobs::RunAt))
                    .col(ColumnDef::new(ScheduledJobs::Status).string_len(20).not_null())
                    .col(ColumnDef::new(ScheduledJobs::Attempts).integer().not_null().default(0))
                    .col(ColumnDef::new(ScheduledJobs::LastError).text().null())
                    .col(&mut timestamp(ScheduledJobs::CreatedAt))
                    .col(&mut timestamp(ScheduledJobs::UpdatedAt))
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_scheduled_jobs_status_run_at")
                    .table(ScheduledJobs::Table)
                    .col(ScheduledJobs::Status)
                    .col(ScheduledJobs::RunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(&mut id_col(backend, Notifications::Id))
                    .col(ColumnDef::new(Notifications::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Notifications::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Notifications::Body).text().not_null())
                    .col(ColumnDef::new(Notifications::Data).json().null())
                    .col(ColumnDef::new(Notifications::IsRead).boolean().not_null().default(false))
                    .col(&mut timestamp(Notifications::CreatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "notifications",
            "scheduled_jobs",
            "wallet_transactions",
            "wallets",
            "commission_rules",
            "cancellation_policy_rules",
            "cancellation_policies",
            "coupon_redemptions",
            "coupons",
            "points_ledger",
            "payment_transactions",
            "bookings",
            "invoices",
            "orders",
            "service_blocks",
            "properties",
            "restaurants",
            "catering_addons",
            "caterings",
            "events",
            "services",
            "cache_versions",
            "settings",
        ] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
