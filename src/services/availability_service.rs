use crate::entities::{
    BookingStatus, ServiceKind, booking_entity as bookings, service_block_entity as blocks,
};
use crate::error::{AppError, AppResult};
use crate::models::AvailabilityResponse;
use crate::services::catalog_service::{
    LockMode, ServiceDetail, ServiceListing, load_listing, with_lock,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};

/// 同一时段的容量上限；餐饮按库存计，不受时段影响
pub fn window_capacity(detail: &ServiceDetail) -> i64 {
    match detail {
        ServiceDetail::Event(event) => event.max_individuals as i64,
        ServiceDetail::Catering { catering, .. } => catering.stock as i64,
        ServiceDetail::Restaurant(restaurant) => restaurant.max_guests as i64,
        ServiceDetail::Property(_) => 1,
    }
}

/// 校验预订时段：结束晚于开始、不早于当前、不超过最长提前天数、在营业时间内（民宿除外）
pub fn check_window(
    listing: &ServiceListing,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if ends_at <= starts_at {
        return Err(AppError::ValidationError("ends_at must be after starts_at".into()));
    }
    if starts_at <= now {
        return Err(AppError::ValidationError("starts_at must be in the future".into()));
    }
    if let Some(days) = listing.service.max_advance_days
        && starts_at > now + Duration::days(days as i64)
    {
        return Err(AppError::ValidationError(format!(
            "Bookings open at most {days} days in advance"
        )));
    }
    if listing.kind() != ServiceKind::Property
        && let (Some(opens), Some(closes)) = (listing.service.opens_at, listing.service.closes_at)
    {
        let same_day = starts_at.date_naive() == ends_at.date_naive();
        let start = starts_at.time();
        let end = ends_at.time();
        if !same_day || start < opens || end > closes {
            return Err(AppError::ValidationError(format!(
                "Bookings must fall within operating hours {opens}-{closes}"
            )));
        }
    }
    Ok(())
}

/// 当前时段已有预订 + 本次请求是否超出容量
pub fn check_capacity(
    listing: &ServiceListing,
    overlapping: &[bookings::Model],
    requested_units: i32,
) -> AppResult<()> {
    let booked: i64 = overlapping.iter().map(|b| b.units as i64).sum();
    let requested = requested_units as i64;
    match &listing.detail {
        ServiceDetail::Catering { catering, .. } => {
            if requested > catering.stock as i64 {
                return Err(AppError::StockExceeded(format!(
                    "Only {} unit(s) left in stock",
                    catering.stock
                )));
            }
        }
        ServiceDetail::Property(_) => {
            if !overlapping.is_empty() {
                return Err(AppError::CapacityExceeded(
                    "Property is already booked for these dates".into(),
                ));
            }
        }
        detail => {
            let capacity = window_capacity(detail);
            if booked + requested > capacity {
                return Err(AppError::CapacityExceeded(format!(
                    "Only {} of {capacity} place(s) left for this time",
                    (capacity - booked).max(0)
                )));
            }
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct AvailabilityService {
    pool: DatabaseConnection,
}

impl AvailabilityService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 与时段重叠的未取消预订
    pub async fn overlapping_bookings<C: ConnectionTrait>(
        conn: &C,
        service_id: i64,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        lock: LockMode,
    ) -> AppResult<Vec<bookings::Model>> {
        let rows = with_lock(
            bookings::Entity::find()
                .filter(bookings::Column::ServiceId.eq(service_id))
                .filter(bookings::Column::Status.ne(BookingStatus::Cancelled))
                .filter(bookings::Column::StartsAt.lt(ends_at))
                .filter(bookings::Column::EndsAt.gt(starts_at))
                .order_by_asc(bookings::Column::Id),
            lock,
        )
        .all(conn)
        .await?;
        Ok(rows)
    }

    pub async fn check_blocks<C: ConnectionTrait>(
        conn: &C,
        service_id: i64,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let blocked = blocks::Entity::find()
            .filter(blocks::Column::ServiceId.eq(service_id))
            .filter(blocks::Column::StartsAt.lt(ends_at))
            .filter(blocks::Column::EndsAt.gt(starts_at))
            .one(conn)
            .await?;
        match blocked {
            Some(block) => Err(AppError::Conflict(format!(
                "Service is unavailable: {}",
                block.reason.as_deref().unwrap_or("blocked by provider")
            ))),
            None => Ok(()),
        }
    }

    /// 共享锁下的预检查，仅作提示；写事务中会在排他锁下复核
    pub async fn precheck(
        &self,
        listing: &ServiceListing,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        units: i32,
    ) -> AppResult<()> {
        let txn = self.pool.begin().await?;
        let overlapping = Self::overlapping_bookings(
            &txn,
            listing.service.id,
            starts_at,
            ends_at,
            LockMode::Shared,
        )
        .await?;
        txn.commit().await?;
        check_capacity(listing, &overlapping, units)
    }

    /// GET /services/{id}/availability
    pub async fn availability(
        &self,
        service_id: i64,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> AppResult<AvailabilityResponse> {
        if ends_at <= starts_at {
            return Err(AppError::ValidationError("ends_at must be after starts_at".into()));
        }
        let txn = self.pool.begin().await?;
        let listing = load_listing(&txn, service_id, LockMode::Shared).await?;
        let overlapping =
            Self::overlapping_bookings(&txn, service_id, starts_at, ends_at, LockMode::Shared)
                .await?;
        let blocked = Self::check_blocks(&txn, service_id, starts_at, ends_at)
            .await
            .is_err();
        txn.commit().await?;

        let capacity = window_capacity(&listing.detail);
        let booked_units = match listing.detail {
            // 库存已在下单时扣减
            ServiceDetail::Catering { .. } => 0,
            _ => overlapping.iter().map(|b| b.units as i64).sum(),
        };
        let remaining = (capacity - booked_units).max(0);
        Ok(AvailabilityResponse {
            service_id,
            capacity,
            booked_units,
            remaining,
            blocked,
            available: listing.service.is_approved && !blocked && remaining > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{event_entity, property_entity, service_entity};
    use chrono::NaiveTime;

    fn listing(kind: ServiceKind, detail: ServiceDetail) -> ServiceListing {
        let now = Utc::now();
        ServiceListing {
            service: service_entity::Model {
                id: 1,
                provider_id: 2,
                name: "svc".into(),
                kind,
                is_approved: true,
                rating: None,
                opens_at: None,
                closes_at: None,
                max_advance_days: Some(30),
                created_at: now,
                updated_at: now,
            },
            detail,
        }
    }

    fn booking(units: i32) -> bookings::Model {
        let now = Utc::now();
        bookings::Model {
            id: 1,
            user_id: 3,
            service_id: 1,
            provider_id: 2,
            order_id: None,
            reference: "BK".into(),
            starts_at: now,
            ends_at: now,
            units,
            booking_details: serde_json::json!({}),
            subtotal: 0,
            tax: 0,
            discount: 0,
            points_used: 0,
            points_value: 0,
            total: 0,
            status: BookingStatus::Confirmed,
            payment_method: "test".into(),
            coupon_code: None,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn event_listing(max: i32) -> ServiceListing {
        listing(
            ServiceKind::Event,
            ServiceDetail::Event(event_entity::Model {
                service_id: 1,
                price_per_person: 1_000,
                max_individuals: max,
            }),
        )
    }

    #[test]
    fn test_event_capacity_counts_overlapping_units() {
        let l = event_listing(10);
        assert!(check_capacity(&l, &[booking(6)], 4).is_ok());
        assert!(matches!(
            check_capacity(&l, &[booking(6)], 5),
            Err(AppError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_property_is_exclusive() {
        let l = listing(
            ServiceKind::Property,
            ServiceDetail::Property(property_entity::Model {
                service_id: 1,
                nightly_rate: 1,
                cleaning_fee: 0,
                max_adults: 2,
                max_children: 0,
            }),
        );
        assert!(check_capacity(&l, &[], 1).is_ok());
        assert!(check_capacity(&l, &[booking(1)], 1).is_err());
    }

    #[test]
    fn test_window_rules() {
        let now = Utc::now();
        let l = event_listing(10);
        let start = now + Duration::days(1);
        assert!(check_window(&l, start, start + Duration::hours(2), now).is_ok());
        assert!(check_window(&l, start, start, now).is_err());
        assert!(check_window(&l, now - Duration::hours(1), now + Duration::hours(1), now).is_err());
        let far = now + Duration::days(40);
        assert!(check_window(&l, far, far + Duration::hours(1), now).is_err());
    }

    #[test]
    fn test_operating_hours() {
        let now = Utc::now();
        let mut l = event_listing(10);
        l.service.opens_at = NaiveTime::from_hms_opt(9, 0, 0);
        l.service.closes_at = NaiveTime::from_hms_opt(17, 0, 0);
        let day = (now + Duration::days(2)).date_naive();
        let at = |h: u32| day.and_hms_opt(h, 0, 0).unwrap().and_utc();
        assert!(check_window(&l, at(10), at(12), now).is_ok());
        assert!(check_window(&l, at(7), at(9), now).is_err());
        assert!(check_window(&l, at(16), at(18), now).is_err());
    }
}
