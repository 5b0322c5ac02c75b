use crate::entities::{
    DiscountType, coupon_entity as coupons, coupon_redemption_entity as redemptions,
    service_entity as services,
};
use crate::error::{AppError, AppResult};
use crate::services::catalog_service::{LockMode, with_lock};
use crate::utils::apply_bp;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, Set,
};

/// 校验通过的优惠码及其可抵扣金额
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponQuote {
    pub coupon: coupons::Model,
    pub discount: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CouponScope {
    pub user_id: i64,
    pub service_id: i64,
    pub provider_id: i64,
}

#[derive(Clone)]
pub struct CouponService {
    pool: DatabaseConnection,
}

impl CouponService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 百分比 (bp) 或固定金额，受 max_discount 与小计约束
    pub fn discount_for(coupon: &coupons::Model, subtotal: i64) -> i64 {
        let raw = match coupon.discount_type {
            DiscountType::Percentage => apply_bp(subtotal, coupon.discount_value),
            DiscountType::Fixed => coupon.discount_value,
        };
        let capped = match coupon.max_discount {
            Some(max) => raw.min(max),
            None => raw,
        };
        capped.clamp(0, subtotal.max(0))
    }

    /// 不含用量的静态校验：启用、有效期、适用范围、最低消费
    fn check_rules(
        coupon: &coupons::Model,
        scope: CouponScope,
        subtotal: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if !coupon.is_active {
            return Err(AppError::ValidationError("Coupon is not active".into()));
        }
        if coupon.starts_at.is_some_and(|at| now < at) {
            return Err(AppError::ValidationError("Coupon is not yet valid".into()));
        }
        if coupon.expires_at.is_some_and(|at| now >= at) {
            return Err(AppError::ValidationError("Coupon has expired".into()));
        }
        if coupon.service_id.is_some_and(|id| id != scope.service_id) {
            return Err(AppError::ValidationError(
                "Coupon does not apply to this service".into(),
            ));
        }
        if coupon.provider_id.is_some_and(|id| id != scope.provider_id) {
            return Err(AppError::ValidationError(
                "Coupon does not apply to this provider".into(),
            ));
        }
        if subtotal < coupon.min_subtotal {
            return Err(AppError::ValidationError(format!(
                "Coupon requires a minimum subtotal of {}",
                coupon.min_subtotal
            )));
        }
        Ok(())
    }

    async fn check_usage<C: ConnectionTrait>(
        conn: &C,
        coupon: &coupons::Model,
        user_id: i64,
    ) -> AppResult<()> {
        if coupon
            .usage_limit
            .is_some_and(|limit| coupon.used_count >= limit)
        {
            return Err(AppError::ValidationError("Coupon usage limit reached".into()));
        }
        if let Some(limit) = coupon.per_user_limit {
            let used = redemptions::Entity::find()
                .filter(redemptions::Column::CouponId.eq(coupon.id))
                .filter(redemptions::Column::UserId.eq(user_id))
                .count(conn)
                .await?;
            if used >= limit.max(0) as u64 {
                return Err(AppError::ValidationError(
                    "Coupon already used the maximum number of times".into(),
                ));
            }
        }
        Ok(())
    }

    async fn find_by_code<C: ConnectionTrait>(
        conn: &C,
        code: &str,
        lock: LockMode,
    ) -> AppResult<coupons::Model> {
        let code = code.trim().to_uppercase();
        with_lock(
            coupons::Entity::find().filter(coupons::Column::Code.eq(code.clone())),
            lock,
        )
        .one(conn)
        .await?
        .ok_or_else(|| AppError::ValidationError(format!("Coupon {code} is invalid")))
    }

    /// 按服务查出服务方后报价
    pub async fn validate_for_service(
        &self,
        user_id: i64,
        service_id: i64,
        code: &str,
        subtotal: i64,
    ) -> AppResult<CouponQuote> {
        let service = services::Entity::find_by_id(service_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Service {service_id} not found")))?;
        let scope = CouponScope {
            user_id,
            service_id,
            provider_id: service.provider_id,
        };
        self.validate(code, scope, subtotal).await
    }

    /// 仅校验并报价，不记录使用
    pub async fn validate(
        &self,
        code: &str,
        scope: CouponScope,
        subtotal: i64,
    ) -> AppResult<CouponQuote> {
        self.validate_in(&self.pool, code, scope, subtotal).await
    }

    pub async fn validate_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        scope: CouponScope,
        subtotal: i64,
    ) -> AppResult<CouponQuote> {
        let coupon = Self::find_by_code(conn, code, LockMode::None).await?;
        Self::check_rules(&coupon, scope, subtotal, Utc::now())?;
        Self::check_usage(conn, &coupon, scope.user_id).await?;
        let discount = Self::discount_for(&coupon, subtotal);
        Ok(CouponQuote { coupon, discount })
    }

    /// 事务内锁定优惠码并复核用量，然后写入使用记录
    pub async fn redeem_tx(
        &self,
        txn: &DatabaseTransaction,
        code: &str,
        scope: CouponScope,
        subtotal: i64,
        booking_id: Option<i64>,
        order_id: Option<i64>,
    ) -> AppResult<CouponQuote> {
        let coupon = Self::find_by_code(txn, code, LockMode::Exclusive).await?;
        Self::check_rules(&coupon, scope, subtotal, Utc::now())?;
        Self::check_usage(txn, &coupon, scope.user_id).await?;
        let discount = Self::discount_for(&coupon, subtotal);

        coupons::Entity::update_many()
            .col_expr(
                coupons::Column::UsedCount,
                Expr::col(coupons::Column::UsedCount).add(1),
            )
            .filter(coupons::Column::Id.eq(coupon.id))
            .exec(txn)
            .await?;

        redemptions::ActiveModel {
            coupon_id: Set(coupon.id),
            user_id: Set(scope.user_id),
            booking_id: Set(booking_id),
            order_id: Set(order_id),
            discount_amount: Set(discount),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        Ok(CouponQuote { coupon, discount })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(discount_type: DiscountType, value: i64, max: Option<i64>) -> coupons::Model {
        coupons::Model {
            id: 1,
            code: "SAVE".into(),
            discount_type,
            discount_value: value,
            min_subtotal: 1_000,
            max_discount: max,
            usage_limit: Some(10),
            per_user_limit: Some(1),
            used_count: 0,
            service_id: None,
            provider_id: Some(9),
            starts_at: None,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn scope() -> CouponScope {
        CouponScope {
            user_id: 1,
            service_id: 2,
            provider_id: 9,
        }
    }

    #[test]
    fn test_percentage_discount_respects_max() {
        let c = coupon(DiscountType::Percentage, 2_000, Some(1_500));
        assert_eq!(CouponService::discount_for(&c, 5_000), 1_000);
        assert_eq!(CouponService::discount_for(&c, 20_000), 1_500);
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let c = coupon(DiscountType::Fixed, 3_000, None);
        assert_eq!(CouponService::discount_for(&c, 2_000), 2_000);
    }

    #[test]
    fn test_rules_reject_scope_minimum_and_expiry() {
        let now = Utc::now();
        let c = coupon(DiscountType::Fixed, 500, None);
        assert!(CouponService::check_rules(&c, scope(), 2_000, now).is_ok());
        assert!(CouponService::check_rules(&c, scope(), 500, now).is_err());

        let other_provider = CouponScope {
            provider_id: 3,
            ..scope()
        };
        assert!(CouponService::check_rules(&c, other_provider, 2_000, now).is_err());

        let mut expired = c.clone();
        expired.expires_at = Some(now - chrono::Duration::hours(1));
        assert!(CouponService::check_rules(&expired, scope(), 2_000, now).is_err());
    }
}
