//! 预订编排
//!
//! 单个预订流程:
//! 1. 幂等预检查（无锁，命中则直接返回原结果，不扣款）
//! 2. 服务 / 时段 / 容量校验（共享锁预检查，仅作提示）
//! 3. 计费：小计 -> 优惠 -> 税 -> 积分
//! 4. 扣款（事务外）
//! 5. 写事务：幂等复核 -> 锁服务行 -> 再次幂等复核 -> 锁库存行 -> 锁重叠预订 -> 复核容量 -> 写入
//! 6. 事务失败时原路退款；提交后托管资金并发送通知（失败只记录日志）

use crate::entities::{
    BookingStatus, ServiceKind, booking_entity as bookings, cache_version_entity as cache_versions,
    catering_entity as caterings, invoice_entity as invoices, order_entity as orders,
    payment_transaction_entity as payments,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    BookingDetailsInput, BookingQuery, BulkCateringItem, CreateBookingRequest,
    CreateBulkCateringRequest, PaginatedResponse, PaginationParams,
};
use crate::services::availability_service::{AvailabilityService, check_capacity, check_window};
use crate::services::catalog_service::{LockMode, ServiceListing, load_listing, with_lock};
use crate::services::commission_service::{CommissionBreakdown, CommissionService};
use crate::services::coupon_service::{CouponScope, CouponService};
use crate::services::escrow_service::{EscrowService, split_charge};
use crate::services::fee_calculator::{FeeBreakdown, FeeCalculator};
use crate::services::job_queue::JobQueue;
use crate::services::notification_service::NotificationService;
use crate::services::order_factory::{
    DefaultInvoiceFactory, DefaultOrderFactory, InvoiceDraft, InvoiceFactory, ORDER_STATUS_COMPLETED,
    OrderDraft, OrderFactory,
};
use crate::services::payment_service::PaymentService;
use crate::services::points_ledger_service::PointsLedgerService;
use crate::services::settings_service::{PlatformSettings, SettingsProvider};
use crate::utils::generate_booking_reference;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const SEARCH_CACHE: &str = "search";

#[derive(Debug, Clone, PartialEq)]
pub struct BookingOutcome {
    pub booking: bookings::Model,
    pub order_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub payment_transaction_id: Option<i64>,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkBookingOutcome {
    pub bookings: Vec<bookings::Model>,
    pub order_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub payment_transaction_id: Option<i64>,
    pub total: i64,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub booking: bookings::Model,
    pub points_earned: i64,
    pub released_amount: i64,
}

/// 扣款前已完成计算的单个预订
struct PreparedBooking {
    listing: ServiceListing,
    units: i32,
    fees: FeeBreakdown,
    details_json: serde_json::Value,
}

struct PreparedBulkItem {
    service_id: i64,
    item: BulkCateringItem,
    units: i32,
    fees: FeeBreakdown,
    kind: ServiceKind,
    details_json: serde_json::Value,
}

enum Persisted<T> {
    Created(T),
    Replayed(bookings::Model),
}

fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

fn bulk_item_key(base: &str, index: usize) -> String {
    format!("{base}-{index}")
}

/// 积分每满一个货币单位（100 分）按 earn_rate 发放
pub fn points_for_total(total: i64, earn_rate: i64) -> i64 {
    if total <= 0 || earn_rate <= 0 {
        return 0;
    }
    total / 100 * earn_rate
}

#[derive(Clone)]
pub struct BookingService {
    pool: DatabaseConnection,
    settings: Arc<dyn SettingsProvider>,
    payment_service: PaymentService,
    escrow_service: EscrowService,
    points_service: PointsLedgerService,
    coupon_service: CouponService,
    notification_service: NotificationService,
    availability_service: AvailabilityService,
    commission_service: CommissionService,
    job_queue: JobQueue,
    order_factory: Arc<dyn OrderFactory>,
    invoice_factory: Arc<dyn InvoiceFactory>,
}

impl BookingService {
    pub fn new(
        pool: DatabaseConnection,
        settings: Arc<dyn SettingsProvider>,
        payment_service: PaymentService,
        escrow_service: EscrowService,
        points_service: PointsLedgerService,
        coupon_service: CouponService,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            availability_service: AvailabilityService::new(pool.clone()),
            commission_service: CommissionService::new(),
            job_queue: JobQueue::new(pool.clone()),
            order_factory: Arc::new(DefaultOrderFactory),
            invoice_factory: Arc::new(DefaultInvoiceFactory),
            pool,
            settings,
            payment_service,
            escrow_service,
            points_service,
            coupon_service,
            notification_service,
        }
    }

    pub fn with_factories(
        mut self,
        order_factory: Arc<dyn OrderFactory>,
        invoice_factory: Arc<dyn InvoiceFactory>,
    ) -> Self {
        self.order_factory = order_factory;
        self.invoice_factory = invoice_factory;
        self
    }

    // -----------------------------
    // 单个预订
    // -----------------------------

    pub async fn create_booking(
        &self,
        user_id: i64,
        req: CreateBookingRequest,
    ) -> AppResult<BookingOutcome> {
        let key = normalize_key(req.idempotency_key.as_deref());
        if let Some(key) = &key
            && let Some(existing) = self.find_by_key(&self.pool, user_id, key, LockMode::None).await?
        {
            log::info!("idempotent replay: user={user_id} key={key} booking={}", existing.id);
            return self.replay_outcome(existing).await;
        }

        let settings = PlatformSettings::load(self.settings.as_ref()).await?;
        let prepared = self.prepare_booking(user_id, &req, &settings).await?;

        let payment = if prepared.fees.total > 0 {
            Some(
                self.payment_service
                    .charge(
                        user_id,
                        Some(prepared.listing.service.provider_id),
                        &req.payment_method,
                        req.payment_token.clone(),
                        prepared.fees.total,
                        &format!("Booking for {}", prepared.listing.service.name),
                    )
                    .await?,
            )
        } else {
            None
        };

        let persisted = self
            .persist_booking(user_id, &req, key.as_deref(), &prepared, &settings, payment.as_ref())
            .await;

        let (booking, order, invoice) = match persisted {
            Ok(Persisted::Created(created)) => created,
            Ok(Persisted::Replayed(existing)) => {
                self.compensate(payment.as_ref()).await;
                return self.replay_outcome(existing).await;
            }
            Err(err) => {
                self.compensate(payment.as_ref()).await;
                let existing = self
                    .replay_after_conflict(err, user_id, key.as_deref())
                    .await?;
                return self.replay_outcome(existing).await;
            }
        };

        self.after_commit(std::slice::from_ref(&booking), payment.as_ref())
            .await;

        Ok(BookingOutcome {
            booking,
            order_id: Some(order.id),
            invoice_id: Some(invoice.id),
            payment_transaction_id: payment.map(|p| p.id),
            replayed: false,
        })
    }

    async fn prepare_booking(
        &self,
        user_id: i64,
        req: &CreateBookingRequest,
        settings: &PlatformSettings,
    ) -> AppResult<PreparedBooking> {
        let listing = load_listing(&self.pool, req.service_id, LockMode::None).await?;
        Self::check_bookable(&listing, user_id)?;
        check_window(&listing, req.starts_at, req.ends_at, Utc::now())?;
        AvailabilityService::check_blocks(&self.pool, listing.service.id, req.starts_at, req.ends_at)
            .await?;

        let pricing = listing.detail.pricing();
        let units = pricing.units(&req.details)?;
        let subtotal = pricing.subtotal(&req.details, req.starts_at, req.ends_at)?;
        drop(pricing);

        self.availability_service
            .precheck(&listing, req.starts_at, req.ends_at, units)
            .await?;

        let discount = match req.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => {
                self.coupon_service
                    .validate(code, Self::coupon_scope(user_id, &listing), subtotal)
                    .await?
                    .discount
            }
            None => 0,
        };

        let requested_points = req.points_to_use.unwrap_or(0);
        let available_points = if requested_points > 0 {
            self.points_service.balance(user_id).await?
        } else {
            0
        };
        let fees = FeeCalculator::compute_totals(
            subtotal,
            discount,
            requested_points,
            available_points,
            settings,
        )?;

        if fees.total == 0 && !settings.allow_free_bookings && listing.kind() != ServiceKind::Restaurant
        {
            return Err(AppError::ValidationError(
                "Free bookings are not allowed for this service".into(),
            ));
        }

        let details_json = Self::details_json(&req.details)?;
        Ok(PreparedBooking {
            listing,
            units,
            fees,
            details_json,
        })
    }

    async fn persist_booking(
        &self,
        user_id: i64,
        req: &CreateBookingRequest,
        key: Option<&str>,
        prepared: &PreparedBooking,
        settings: &PlatformSettings,
        payment: Option<&payments::Model>,
    ) -> AppResult<Persisted<(bookings::Model, orders::Model, invoices::Model)>> {
        let txn = self.pool.begin().await?;

        if let Some(key) = key
            && let Some(existing) = self.find_by_key(&txn, user_id, key, LockMode::Exclusive).await?
        {
            txn.commit().await?;
            return Ok(Persisted::Replayed(existing));
        }

        let listing = load_listing(&txn, req.service_id, LockMode::Exclusive).await?;
        // 服务行锁之后复核：同键并发请求在锁上排队，后到者在此看到先提交的预订
        if let Some(key) = key
            && let Some(existing) = self.find_by_key(&txn, user_id, key, LockMode::None).await?
        {
            txn.commit().await?;
            return Ok(Persisted::Replayed(existing));
        }
        Self::check_bookable(&listing, user_id)?;
        let overlapping = AvailabilityService::overlapping_bookings(
            &txn,
            listing.service.id,
            req.starts_at,
            req.ends_at,
            LockMode::Exclusive,
        )
        .await?;
        check_capacity(&listing, &overlapping, prepared.units)?;

        if let Some(catering) = listing.catering() {
            Self::deduct_stock(&txn, catering.clone(), prepared.units).await?;
        }

        let fees = prepared.fees;
        let provider_id = listing.service.provider_id;
        let commission = self
            .commission_service
            .calculate(
                &txn,
                provider_id,
                listing.kind(),
                fees.taxable,
                fees.points_value,
                settings,
            )
            .await?;

        let order = self
            .order_factory
            .create_order(
                &txn,
                &OrderDraft {
                    user_id,
                    provider_id,
                    subtotal: fees.subtotal,
                    tax: fees.tax,
                    discount: fees.discount,
                    total: fees.total,
                },
            )
            .await?;

        let booking = Self::insert_booking(
            &txn,
            NewBookingRow {
                user_id,
                listing: &listing,
                order_id: order.id,
                starts_at: req.starts_at,
                ends_at: req.ends_at,
                units: prepared.units,
                details_json: prepared.details_json.clone(),
                fees,
                payment_method: &req.payment_method,
                coupon_code: req.coupon_code.clone(),
                idempotency_key: key.map(str::to_string),
            },
        )
        .await?;

        let invoice = self
            .invoice_factory
            .create_invoice(&txn, &order, &Self::invoice_draft(fees, commission))
            .await?;

        if let Some(code) = req.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let redeemed = self
                .coupon_service
                .redeem_tx(
                    &txn,
                    code,
                    Self::coupon_scope(user_id, &listing),
                    fees.subtotal,
                    Some(booking.id),
                    Some(order.id),
                )
                .await?;
            if redeemed.discount != fees.discount {
                return Err(AppError::Conflict(
                    "Coupon changed while booking, please retry".into(),
                ));
            }
        }

        if fees.points_used > 0 {
            self.points_service
                .spend_tx(&txn, user_id, fees.points_used, Some(booking.id))
                .await?;
        }

        self.job_queue.schedule_reminders_tx(&txn, &booking).await?;

        if let Some(payment) = payment {
            self.payment_service
                .link_tx(&txn, payment.id, Some(booking.id), order.id)
                .await?;
        }

        Self::bump_cache_version(&txn, SEARCH_CACHE).await?;

        txn.commit().await?;
        log::info!(
            "booking created: id={} ref={} service={} user={user_id} total={}",
            booking.id,
            booking.reference,
            booking.service_id,
            booking.total
        );
        Ok(Persisted::Created((booking, order, invoice)))
    }

    // -----------------------------
    // 批量餐饮预订
    // -----------------------------

    /// 同一服务方的多个餐饮服务合并为一个订单与一次扣款，不使用优惠码与积分
    pub async fn create_bulk_catering_booking(
        &self,
        user_id: i64,
        req: CreateBulkCateringRequest,
    ) -> AppResult<BulkBookingOutcome> {
        if req.items.is_empty() {
            return Err(AppError::ValidationError("items must not be empty".into()));
        }
        let base_key = normalize_key(req.idempotency_key.as_deref());
        if let Some(base) = &base_key
            && let Some(first) = self
                .find_by_key(&self.pool, user_id, &bulk_item_key(base, 0), LockMode::None)
                .await?
        {
            return self.replay_bulk_outcome(first).await;
        }

        let settings = PlatformSettings::load(self.settings.as_ref()).await?;
        let now = Utc::now();

        let mut listings: BTreeMap<i64, ServiceListing> = BTreeMap::new();
        for item in &req.items {
            if !listings.contains_key(&item.service_id) {
                let listing = load_listing(&self.pool, item.service_id, LockMode::None).await?;
                listings.insert(item.service_id, listing);
            }
        }

        let prepared = Self::prepare_bulk_items(&req, &listings, user_id, now, &settings)?;
        for item in &prepared {
            AvailabilityService::check_blocks(
                &self.pool,
                item.service_id,
                item.item.starts_at,
                item.item.ends_at,
            )
            .await?;
        }

        let total: i64 = prepared.iter().map(|p| p.fees.total).sum();
        if total == 0 && !settings.allow_free_bookings {
            return Err(AppError::ValidationError(
                "Free bookings are not allowed for this service".into(),
            ));
        }

        let payment = if total > 0 {
            Some(
                self.payment_service
                    .charge(
                        user_id,
                        Some(req.provider_id),
                        &req.payment_method,
                        req.payment_token.clone(),
                        total,
                        &format!("Bulk catering order ({} items)", prepared.len()),
                    )
                    .await?,
            )
        } else {
            None
        };

        let persisted = self
            .persist_bulk(user_id, &req, base_key.as_deref(), &prepared, &settings, payment.as_ref())
            .await;

        let (created, order, invoice) = match persisted {
            Ok(Persisted::Created(created)) => created,
            Ok(Persisted::Replayed(first)) => {
                self.compensate(payment.as_ref()).await;
                return self.replay_bulk_outcome(first).await;
            }
            Err(err) => {
                self.compensate(payment.as_ref()).await;
                let first_key = base_key.as_deref().map(|base| bulk_item_key(base, 0));
                let first = self
                    .replay_after_conflict(err, user_id, first_key.as_deref())
                    .await?;
                return self.replay_bulk_outcome(first).await;
            }
        };

        self.after_commit(&created, payment.as_ref()).await;

        Ok(BulkBookingOutcome {
            bookings: created,
            order_id: Some(order.id),
            invoice_id: Some(invoice.id),
            payment_transaction_id: payment.map(|p| p.id),
            total,
            replayed: false,
        })
    }

    /// 按剩余库存逐项校验（同一服务出现多次时累计扣减）
    fn prepare_bulk_items(
        req: &CreateBulkCateringRequest,
        listings: &BTreeMap<i64, ServiceListing>,
        user_id: i64,
        now: DateTime<Utc>,
        settings: &PlatformSettings,
    ) -> AppResult<Vec<PreparedBulkItem>> {
        let mut remaining: BTreeMap<i64, i64> = BTreeMap::new();
        let mut prepared = Vec::with_capacity(req.items.len());

        for item in &req.items {
            let listing = listings.get(&item.service_id).ok_or_else(|| {
                AppError::NotFound(format!("Service {} not found", item.service_id))
            })?;
            let catering = listing.catering().ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Service {} is not a catering service",
                    item.service_id
                ))
            })?;
            if listing.service.provider_id != req.provider_id {
                return Err(AppError::ValidationError(format!(
                    "Service {} does not belong to provider {}",
                    item.service_id, req.provider_id
                )));
            }
            Self::check_bookable(listing, user_id)?;
            check_window(listing, item.starts_at, item.ends_at, now)?;

            let details = Self::bulk_details(item);
            let pricing = listing.detail.pricing();
            let units = pricing.units(&details)?;
            let subtotal = pricing.subtotal(&details, item.starts_at, item.ends_at)?;

            let left = remaining
                .entry(item.service_id)
                .or_insert(catering.stock as i64);
            if units as i64 > *left {
                return Err(AppError::StockExceeded(format!(
                    "Only {} unit(s) of service {} left in stock",
                    *left, item.service_id
                )));
            }
            *left -= units as i64;

            let fees = FeeCalculator::compute_totals(subtotal, 0, 0, 0, settings)?;
            prepared.push(PreparedBulkItem {
                service_id: item.service_id,
                item: item.clone(),
                units,
                fees,
                kind: listing.kind(),
                details_json: Self::details_json(&details)?,
            });
        }
        Ok(prepared)
    }

    async fn persist_bulk(
        &self,
        user_id: i64,
        req: &CreateBulkCateringRequest,
        base_key: Option<&str>,
        prepared: &[PreparedBulkItem],
        settings: &PlatformSettings,
        payment: Option<&payments::Model>,
    ) -> AppResult<Persisted<(Vec<bookings::Model>, orders::Model, invoices::Model)>> {
        let txn = self.pool.begin().await?;

        if let Some(base) = base_key
            && let Some(first) = self
                .find_by_key(&txn, user_id, &bulk_item_key(base, 0), LockMode::Exclusive)
                .await?
        {
            txn.commit().await?;
            return Ok(Persisted::Replayed(first));
        }

        // 按 id 升序锁定全部餐饮行
        let service_ids: BTreeSet<i64> = prepared.iter().map(|p| p.service_id).collect();
        let mut locked: BTreeMap<i64, ServiceListing> = BTreeMap::new();
        for service_id in service_ids {
            let listing = load_listing(&txn, service_id, LockMode::Exclusive).await?;
            locked.insert(service_id, listing);
        }
        if let Some(base) = base_key
            && let Some(first) = self
                .find_by_key(&txn, user_id, &bulk_item_key(base, 0), LockMode::None)
                .await?
        {
            txn.commit().await?;
            return Ok(Persisted::Replayed(first));
        }

        let mut needed: BTreeMap<i64, i32> = BTreeMap::new();
        for item in prepared {
            *needed.entry(item.service_id).or_default() += item.units;
        }
        for (service_id, units) in &needed {
            let catering = locked
                .get(service_id)
                .and_then(ServiceListing::catering)
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "Service {service_id} is not a catering service"
                    ))
                })?;
            if *units > catering.stock {
                return Err(AppError::StockExceeded(format!(
                    "Only {} unit(s) of service {service_id} left in stock",
                    catering.stock
                )));
            }
            Self::deduct_stock(&txn, catering.clone(), *units).await?;
        }

        let mut commission = CommissionBreakdown::default();
        let mut totals = FeeBreakdown {
            subtotal: 0,
            discount: 0,
            taxable: 0,
            tax: 0,
            points_used: 0,
            points_value: 0,
            total: 0,
        };
        for item in prepared {
            let item_commission = self
                .commission_service
                .calculate(&txn, req.provider_id, item.kind, item.fees.taxable, 0, settings)
                .await?;
            commission = CommissionService::merge(commission, item_commission);
            totals.subtotal += item.fees.subtotal;
            totals.taxable += item.fees.taxable;
            totals.tax += item.fees.tax;
            totals.total += item.fees.total;
        }

        let order = self
            .order_factory
            .create_order(
                &txn,
                &OrderDraft {
                    user_id,
                    provider_id: req.provider_id,
                    subtotal: totals.subtotal,
                    tax: totals.tax,
                    discount: 0,
                    total: totals.total,
                },
            )
            .await?;

        let mut created = Vec::with_capacity(prepared.len());
        for (index, item) in prepared.iter().enumerate() {
            let listing = locked.get(&item.service_id).ok_or_else(|| {
                AppError::InternalError(format!("Service {} was not locked", item.service_id))
            })?;
            let booking = Self::insert_booking(
                &txn,
                NewBookingRow {
                    user_id,
                    listing,
                    order_id: order.id,
                    starts_at: item.item.starts_at,
                    ends_at: item.item.ends_at,
                    units: item.units,
                    details_json: item.details_json.clone(),
                    fees: item.fees,
                    payment_method: &req.payment_method,
                    coupon_code: None,
                    idempotency_key: base_key.map(|base| bulk_item_key(base, index)),
                },
            )
            .await?;
            self.job_queue.schedule_reminders_tx(&txn, &booking).await?;
            created.push(booking);
        }

        let invoice = self
            .invoice_factory
            .create_invoice(&txn, &order, &Self::invoice_draft(totals, commission))
            .await?;

        if let Some(payment) = payment {
            self.payment_service
                .link_tx(&txn, payment.id, None, order.id)
                .await?;
        }

        Self::bump_cache_version(&txn, SEARCH_CACHE).await?;
        txn.commit().await?;
        log::info!(
            "bulk catering order created: order={} items={} user={user_id} total={}",
            order.id,
            created.len(),
            totals.total
        );
        Ok(Persisted::Created((created, order, invoice)))
    }

    // -----------------------------
    // 查询 / 完成
    // -----------------------------

    /// 顾客、服务方与管理员可查看
    pub async fn get_booking(
        &self,
        viewer_id: i64,
        is_admin: bool,
        booking_id: i64,
    ) -> AppResult<bookings::Model> {
        let booking = bookings::Entity::find_by_id(booking_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;
        if !is_admin && booking.user_id != viewer_id && booking.provider_id != viewer_id {
            return Err(AppError::Forbidden);
        }
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        viewer_id: i64,
        as_provider: bool,
        query: &BookingQuery,
    ) -> AppResult<PaginatedResponse<bookings::Model>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let mut base = bookings::Entity::find();
        base = if as_provider {
            base.filter(bookings::Column::ProviderId.eq(viewer_id))
        } else {
            base.filter(bookings::Column::UserId.eq(viewer_id))
        };
        if let Some(status) = query.status {
            base = base.filter(bookings::Column::Status.eq(status));
        }

        let total = base.clone().count(&self.pool).await?;
        let items = base
            .order_by_desc(bookings::Column::StartsAt)
            .order_by_desc(bookings::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;
        Ok(PaginatedResponse::new(items, params, total))
    }

    /// 服务方确认服务已完成：释放托管资金，顾客获得积分
    pub async fn complete_booking(
        &self,
        provider_id: i64,
        booking_id: i64,
    ) -> AppResult<CompletionOutcome> {
        let settings = PlatformSettings::load(self.settings.as_ref()).await?;
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        let booking = with_lock(bookings::Entity::find_by_id(booking_id), LockMode::Exclusive)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;
        if booking.provider_id != provider_id {
            return Err(AppError::Forbidden);
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::Unprocessable(format!(
                "Booking in status {} cannot be completed",
                booking.status
            )));
        }
        if booking.ends_at > now {
            return Err(AppError::Unprocessable("Booking has not ended yet".into()));
        }

        let mut am = booking.clone().into_active_model();
        am.status = Set(BookingStatus::Completed);
        am.updated_at = Set(now);
        let completed = am.update(&txn).await?;

        let mut released_amount = 0;
        if let Some(order_id) = completed.order_id {
            let open = bookings::Entity::find()
                .filter(bookings::Column::OrderId.eq(order_id))
                .filter(bookings::Column::Status.eq(BookingStatus::Confirmed))
                .count(&txn)
                .await?;
            // 订单内全部完成后才结算
            if open == 0 {
                let payment = payments::Entity::find()
                    .filter(payments::Column::OrderId.eq(order_id))
                    .one(&txn)
                    .await?;
                if let Some(payment) = payment {
                    let released = self
                        .escrow_service
                        .release_to_provider_tx(&txn, payment.id)
                        .await?;
                    released_amount = released.held_amount;
                }
                if let Some(order) = orders::Entity::find_by_id(order_id).one(&txn).await? {
                    let mut am = order.into_active_model();
                    am.status = Set(ORDER_STATUS_COMPLETED.to_string());
                    am.updated_at = Set(now);
                    am.update(&txn).await?;
                }
            }
        }

        let points_earned = points_for_total(completed.total, settings.points_earn_rate);
        if points_earned > 0 {
            self.points_service
                .earn_tx(
                    &txn,
                    completed.user_id,
                    points_earned,
                    Some(now + Duration::days(settings.points_expiry_days)),
                    Some(completed.id),
                    json!({ "reason": "booking_completed", "booking_id": completed.id }),
                )
                .await?;
        }

        txn.commit().await?;
        log::info!(
            "booking completed: id={} released={released_amount} points={points_earned}",
            completed.id
        );
        Ok(CompletionOutcome {
            booking: completed,
            points_earned,
            released_amount,
        })
    }

    // -----------------------------
    // 内部辅助方法
    // -----------------------------

    fn check_bookable(listing: &ServiceListing, user_id: i64) -> AppResult<()> {
        if listing.service.provider_id == user_id {
            return Err(AppError::ValidationError(
                "You cannot book your own service".into(),
            ));
        }
        if !listing.service.is_approved {
            return Err(AppError::ValidationError(
                "Service is not available for booking".into(),
            ));
        }
        Ok(())
    }

    fn coupon_scope(user_id: i64, listing: &ServiceListing) -> CouponScope {
        CouponScope {
            user_id,
            service_id: listing.service.id,
            provider_id: listing.service.provider_id,
        }
    }

    fn bulk_details(item: &BulkCateringItem) -> BookingDetailsInput {
        BookingDetailsInput {
            quantity: Some(item.quantity),
            addon_ids: item.addon_ids.clone(),
            fulfillment: Some(item.fulfillment),
            delivery_address: item.delivery_address.clone(),
            ..Default::default()
        }
    }

    fn details_json(details: &BookingDetailsInput) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(details)?)
    }

    fn invoice_draft(fees: FeeBreakdown, commission: CommissionBreakdown) -> InvoiceDraft {
        let (provider_amount, platform_amount) = split_charge(fees.total, commission.provider_share);
        InvoiceDraft {
            subtotal: fees.subtotal,
            tax: fees.tax,
            discount: fees.discount,
            points_value: fees.points_value,
            total: fees.total,
            commission,
            provider_amount,
            platform_amount,
        }
    }

    /// 唯一索引冲突说明同键请求已先提交，改为返回已有预订
    async fn replay_after_conflict(
        &self,
        err: AppError,
        user_id: i64,
        key: Option<&str>,
    ) -> AppResult<bookings::Model> {
        let Some(key) = key.filter(|_| err.is_unique_violation()) else {
            return Err(err);
        };
        match self.find_by_key(&self.pool, user_id, key, LockMode::None).await? {
            Some(existing) => {
                log::info!("idempotent replay after conflict: user={user_id} key={key}");
                Ok(existing)
            }
            None => Err(err),
        }
    }

    async fn find_by_key<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        key: &str,
        lock: LockMode,
    ) -> AppResult<Option<bookings::Model>> {
        Ok(with_lock(
            bookings::Entity::find()
                .filter(bookings::Column::UserId.eq(user_id))
                .filter(bookings::Column::IdempotencyKey.eq(key)),
            lock,
        )
        .one(conn)
        .await?)
    }

    async fn deduct_stock(
        txn: &DatabaseTransaction,
        catering: caterings::Model,
        units: i32,
    ) -> AppResult<()> {
        if units > catering.stock {
            return Err(AppError::StockExceeded(format!(
                "Only {} unit(s) left in stock",
                catering.stock
            )));
        }
        let left = catering.stock - units;
        let mut am = catering.into_active_model();
        am.stock = Set(left);
        am.update(txn).await?;
        Ok(())
    }

    async fn insert_booking(
        txn: &DatabaseTransaction,
        row: NewBookingRow<'_>,
    ) -> AppResult<bookings::Model> {
        let now = Utc::now();
        let booking = bookings::ActiveModel {
            user_id: Set(row.user_id),
            service_id: Set(row.listing.service.id),
            provider_id: Set(row.listing.service.provider_id),
            order_id: Set(Some(row.order_id)),
            reference: Set(generate_booking_reference()),
            starts_at: Set(row.starts_at),
            ends_at: Set(row.ends_at),
            units: Set(row.units),
            booking_details: Set(row.details_json),
            subtotal: Set(row.fees.subtotal),
            tax: Set(row.fees.tax),
            discount: Set(row.fees.discount),
            points_used: Set(row.fees.points_used),
            points_value: Set(row.fees.points_value),
            total: Set(row.fees.total),
            status: Set(BookingStatus::Confirmed),
            payment_method: Set(row.payment_method.to_string()),
            coupon_code: Set(row.coupon_code),
            idempotency_key: Set(row.idempotency_key),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(booking)
    }

    /// 搜索缓存版本号 +1，读取方据此失效旧缓存
    async fn bump_cache_version(txn: &DatabaseTransaction, name: &str) -> AppResult<i64> {
        let current = with_lock(
            cache_versions::Entity::find_by_id(name.to_string()),
            LockMode::Exclusive,
        )
        .one(txn)
        .await?;
        let version = match current {
            Some(row) => {
                let next = row.version + 1;
                let mut am = row.into_active_model();
                am.version = Set(next);
                am.update(txn).await?;
                next
            }
            None => {
                cache_versions::ActiveModel {
                    name: Set(name.to_string()),
                    version: Set(1),
                }
                .insert(txn)
                .await?;
                1
            }
        };
        Ok(version)
    }

    /// 写事务失败或被判定为重复请求时，退回本次扣款
    async fn compensate(&self, payment: Option<&payments::Model>) {
        let Some(payment) = payment else {
            return;
        };
        if let Err(err) = self.payment_service.refund_unheld(payment.id).await {
            log::error!(
                "compensating refund for payment {} failed, manual action required: {err}",
                payment.id
            );
        }
    }

    /// 提交后的副作用：托管与通知，失败不回滚预订
    async fn after_commit(&self, created: &[bookings::Model], payment: Option<&payments::Model>) {
        if let Some(payment) = payment
            && let Err(err) = self.escrow_service.hold(payment.id).await
        {
            log::warn!("escrow hold for payment {} failed: {err}", payment.id);
        }
        for booking in created {
            if let Err(err) = self.notification_service.booking_confirmed(booking).await {
                log::warn!("confirmation notification for booking {} failed: {err}", booking.id);
            }
        }
    }

    async fn order_links(
        &self,
        order_id: Option<i64>,
    ) -> AppResult<(Option<i64>, Option<i64>)> {
        let Some(order_id) = order_id else {
            return Ok((None, None));
        };
        let invoice = invoices::Entity::find()
            .filter(invoices::Column::OrderId.eq(order_id))
            .one(&self.pool)
            .await?;
        let payment = payments::Entity::find()
            .filter(payments::Column::OrderId.eq(order_id))
            .one(&self.pool)
            .await?;
        Ok((invoice.map(|i| i.id), payment.map(|p| p.id)))
    }

    async fn replay_outcome(&self, booking: bookings::Model) -> AppResult<BookingOutcome> {
        let (invoice_id, payment_transaction_id) = self.order_links(booking.order_id).await?;
        Ok(BookingOutcome {
            order_id: booking.order_id,
            invoice_id,
            payment_transaction_id,
            booking,
            replayed: true,
        })
    }

    async fn replay_bulk_outcome(&self, first: bookings::Model) -> AppResult<BulkBookingOutcome> {
        let bookings = match first.order_id {
            Some(order_id) => {
                bookings::Entity::find()
                    .filter(bookings::Column::OrderId.eq(order_id))
                    .order_by_asc(bookings::Column::Id)
                    .all(&self.pool)
                    .await?
            }
            None => vec![first.clone()],
        };
        let (invoice_id, payment_transaction_id) = self.order_links(first.order_id).await?;
        Ok(BulkBookingOutcome {
            total: bookings.iter().map(|b| b.total).sum(),
            bookings,
            order_id: first.order_id,
            invoice_id,
            payment_transaction_id,
            replayed: true,
        })
    }
}

struct NewBookingRow<'a> {
    user_id: i64,
    listing: &'a ServiceListing,
    order_id: i64,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    units: i32,
    details_json: serde_json::Value,
    fees: FeeBreakdown,
    payment_method: &'a str,
    coupon_code: Option<String>,
    idempotency_key: Option<String>,
}
