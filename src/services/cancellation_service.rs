use crate::entities::{
    BookingStatus, ServiceKind, booking_entity as bookings,
    cancellation_policy_entity as policies, cancellation_rule_entity as policy_rules,
    catering_entity as caterings, order_entity as orders, payment_transaction_entity as payments,
    service_entity as services,
};
use crate::error::{AppError, AppResult};
use crate::services::catalog_service::{LockMode, with_lock};
use crate::services::escrow_service::EscrowService;
use crate::services::notification_service::NotificationService;
use crate::services::order_factory::ORDER_STATUS_CANCELLED;
use crate::services::points_ledger_service::PointsLedgerService;
use crate::services::settings_service::{PlatformSettings, SettingsProvider};
use crate::utils::apply_percent;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundQuote {
    pub hours_until_start: i64,
    pub refund_percent: i32,
    pub refund_amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub booking: bookings::Model,
    pub quote: RefundQuote,
    pub points_restored: i64,
}

/// 规则按 hours_before 从大到小，取第一条满足的；都不满足则不退款
pub fn refund_percent(rules: &[policy_rules::Model], hours_until_start: i64) -> i32 {
    let mut sorted: Vec<&policy_rules::Model> = rules.iter().collect();
    sorted.sort_by(|a, b| b.hours_before.cmp(&a.hours_before));
    sorted
        .into_iter()
        .find(|r| hours_until_start >= r.hours_before as i64)
        .map(|r| r.refund_percent.clamp(0, 100))
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct CancellationService {
    pool: DatabaseConnection,
    settings: Arc<dyn SettingsProvider>,
    escrow_service: EscrowService,
    points_service: PointsLedgerService,
    notification_service: NotificationService,
}

impl CancellationService {
    pub fn new(
        pool: DatabaseConnection,
        settings: Arc<dyn SettingsProvider>,
        escrow_service: EscrowService,
        points_service: PointsLedgerService,
        notification_service: NotificationService,
    ) -> Self {
        Self {
            pool,
            settings,
            escrow_service,
            points_service,
            notification_service,
        }
    }

    /// 服务专属策略优先，否则使用平台默认策略 (service_id IS NULL)
    async fn policy_rules<C: ConnectionTrait>(
        conn: &C,
        service_id: i64,
    ) -> AppResult<Vec<policy_rules::Model>> {
        let policy = match policies::Entity::find()
            .filter(policies::Column::ServiceId.eq(service_id))
            .order_by_desc(policies::Column::Id)
            .one(conn)
            .await?
        {
            Some(p) => Some(p),
            None => {
                policies::Entity::find()
                    .filter(policies::Column::ServiceId.is_null())
                    .order_by_desc(policies::Column::Id)
                    .one(conn)
                    .await?
            }
        };
        let Some(policy) = policy else {
            return Ok(Vec::new());
        };
        Ok(policy_rules::Entity::find()
            .filter(policy_rules::Column::PolicyId.eq(policy.id))
            .all(conn)
            .await?)
    }

    pub async fn compute_refund(
        &self,
        booking: &bookings::Model,
        now: DateTime<Utc>,
    ) -> AppResult<RefundQuote> {
        Self::compute_refund_in(&self.pool, booking, now).await
    }

    async fn compute_refund_in<C: ConnectionTrait>(
        conn: &C,
        booking: &bookings::Model,
        now: DateTime<Utc>,
    ) -> AppResult<RefundQuote> {
        let rules = Self::policy_rules(conn, booking.service_id).await?;
        let hours_until_start = (booking.starts_at - now).num_hours();
        let percent = refund_percent(&rules, hours_until_start);
        Ok(RefundQuote {
            hours_until_start,
            refund_percent: percent,
            refund_amount: apply_percent(booking.total, percent),
        })
    }

    /// 顾客取消：退款按策略从托管金额中退回，其余归服务方；恢复餐饮库存并返还已用积分
    pub async fn cancel_booking(
        &self,
        user_id: i64,
        booking_id: i64,
    ) -> AppResult<CancellationOutcome> {
        let settings = PlatformSettings::load(self.settings.as_ref()).await?;
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        let booking = with_lock(bookings::Entity::find_by_id(booking_id), LockMode::Exclusive)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;
        if booking.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        if !matches!(
            booking.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) {
            return Err(AppError::Unprocessable(format!(
                "Booking in status {} cannot be cancelled",
                booking.status
            )));
        }
        if booking.starts_at <= now {
            return Err(AppError::Unprocessable(
                "Booking has already started".into(),
            ));
        }

        if let Some(order_id) = booking.order_id {
            let siblings = bookings::Entity::find()
                .filter(bookings::Column::OrderId.eq(order_id))
                .count(&txn)
                .await?;
            if siblings > 1 {
                return Err(AppError::Unprocessable(
                    "Bookings in a bulk order cannot be cancelled individually".into(),
                ));
            }
        }

        let quote = Self::compute_refund_in(&txn, &booking, now).await?;

        let payment = match booking.order_id {
            Some(order_id) => {
                payments::Entity::find()
                    .filter(payments::Column::OrderId.eq(order_id))
                    .one(&txn)
                    .await?
            }
            None => None,
        };
        let mut refunded = 0;
        if let Some(payment) = payment {
            let (_, amount) = self
                .escrow_service
                .settle_cancellation_tx(&txn, payment.id, quote.refund_amount)
                .await?;
            refunded = amount;
        }

        let service = services::Entity::find_by_id(booking.service_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Service {} not found", booking.service_id)))?;
        if service.kind == ServiceKind::Catering {
            caterings::Entity::update_many()
                .col_expr(
                    caterings::Column::Stock,
                    Expr::col(caterings::Column::Stock).add(booking.units),
                )
                .filter(caterings::Column::ServiceId.eq(booking.service_id))
                .exec(&txn)
                .await?;
        }

        let points_restored = booking.points_used;
        if points_restored > 0 {
            self.points_service
                .earn_tx(
                    &txn,
                    booking.user_id,
                    points_restored,
                    Some(now + Duration::days(settings.points_expiry_days)),
                    Some(booking.id),
                    json!({ "reason": "cancellation", "booking_id": booking.id }),
                )
                .await?;
        }

        if let Some(order_id) = booking.order_id
            && let Some(order) = orders::Entity::find_by_id(order_id).one(&txn).await?
        {
            let mut am = order.into_active_model();
            am.status = Set(ORDER_STATUS_CANCELLED.to_string());
            am.updated_at = Set(now);
            am.update(&txn).await?;
        }

        let mut am = booking.into_active_model();
        am.status = Set(BookingStatus::Cancelled);
        am.updated_at = Set(now);
        let cancelled = am.update(&txn).await?;

        txn.commit().await?;

        if let Err(err) = self
            .notification_service
            .booking_cancelled(&cancelled, refunded)
            .await
        {
            log::warn!("cancellation notification for booking {booking_id} failed: {err}");
        }

        Ok(CancellationOutcome {
            booking: cancelled,
            quote: RefundQuote {
                refund_amount: refunded,
                ..quote
            },
            points_restored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(hours_before: i32, percent: i32) -> policy_rules::Model {
        policy_rules::Model {
            id: hours_before as i64,
            policy_id: 1,
            hours_before,
            refund_percent: percent,
        }
    }

    #[test]
    fn test_first_satisfied_rule_by_largest_threshold() {
        let rules = vec![rule(72, 25), rule(168, 50)];
        assert_eq!(refund_percent(&rules, 200), 50);
        assert_eq!(refund_percent(&rules, 100), 25);
        assert_eq!(refund_percent(&rules, 10), 0);
        assert_eq!(refund_percent(&rules, 168), 50);
    }

    #[test]
    fn test_no_rules_means_no_refund() {
        assert_eq!(refund_percent(&[], 500), 0);
    }
}
