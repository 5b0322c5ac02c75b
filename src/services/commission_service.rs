use crate::entities::{
    BookingStatus, CommissionRuleType, ServiceKind, booking_entity as bookings,
    commission_rule_entity as commission_rules, service_entity as services,
};
use crate::error::AppResult;
use crate::services::settings_service::{BaseCommission, BaseCommissionType, PlatformSettings};
use crate::utils::{apply_bp, clamp_optional};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Alias, Expr, Func};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const VOLUME_WINDOW_DAYS: i64 = 30;

/// 发票中保存的佣金快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommissionBreakdown {
    /// 佣金基数: subtotal - coupon discount
    pub base_amount: i64,
    pub base_commission: i64,
    pub service_type_surcharge: i64,
    pub volume_surcharge: i64,
    pub rating_surcharge: i64,
    /// 各层之和，限制在 [0, base_amount]
    pub total_commission: i64,
    pub points_value: i64,
    /// max(total_commission - points_value, 0)
    pub platform_commission: i64,
    /// base_amount - total_commission，不受积分影响
    pub provider_share: i64,
}

/// 服务方近期表现，用于阶梯佣金
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// 近 30 天已确认/已完成预订总额（美分）
    pub trailing_volume: i64,
    /// 平均评分 × 100，无评分为 None
    pub rating_x100: Option<i64>,
}

#[derive(Clone, Default)]
pub struct CommissionService;

impl CommissionService {
    pub fn new() -> Self {
        Self
    }

    /// 读取规则与服务方统计后计算佣金
    pub async fn calculate<C: ConnectionTrait>(
        &self,
        conn: &C,
        provider_id: i64,
        kind: ServiceKind,
        base_amount: i64,
        points_value: i64,
        settings: &PlatformSettings,
    ) -> AppResult<CommissionBreakdown> {
        let rules = commission_rules::Entity::find()
            .filter(commission_rules::Column::IsActive.eq(true))
            .order_by_asc(commission_rules::Column::Id)
            .all(conn)
            .await?;
        let stats = self.provider_stats(conn, provider_id, Utc::now()).await?;
        Ok(Self::compute(
            base_amount,
            points_value,
            kind,
            &settings.commission,
            &rules,
            stats,
        ))
    }

    pub async fn provider_stats<C: ConnectionTrait>(
        &self,
        conn: &C,
        provider_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<ProviderStats> {
        let since = now - Duration::days(VOLUME_WINDOW_DAYS);
        // Postgres 的 SUM(bigint) 返回 numeric，需要转回 BIGINT
        let trailing_volume = bookings::Entity::find()
            .select_only()
            .column_as(
                Expr::expr(Func::sum(Expr::col(bookings::Column::Total)))
                    .cast_as(Alias::new("BIGINT")),
                "volume",
            )
            .filter(bookings::Column::ProviderId.eq(provider_id))
            .filter(
                bookings::Column::Status
                    .is_in([BookingStatus::Confirmed, BookingStatus::Completed]),
            )
            .filter(bookings::Column::CreatedAt.gte(since))
            .into_tuple::<Option<i64>>()
            .one(conn)
            .await?
            .flatten()
            .unwrap_or(0);

        let ratings: Vec<f64> = services::Entity::find()
            .filter(services::Column::ProviderId.eq(provider_id))
            .filter(services::Column::Rating.is_not_null())
            .all(conn)
            .await?
            .into_iter()
            .filter_map(|s| s.rating)
            .collect();
        let rating_x100 = if ratings.is_empty() {
            None
        } else {
            let avg = ratings.iter().sum::<f64>() / ratings.len() as f64;
            Some((avg * 100.0).round() as i64)
        };

        Ok(ProviderStats {
            trailing_volume,
            rating_x100,
        })
    }

    /// 分层佣金:
    /// 1. 基础佣金（百分比或固定额，受 commission_min / commission_max 约束）
    /// 2. 服务类型附加
    /// 3. 交易量阶梯附加
    /// 4. 评分阶梯附加
    ///
    /// 总额限制在 [0, base_amount]，积分先抵扣平台佣金。
    pub fn compute(
        base_amount: i64,
        points_value: i64,
        kind: ServiceKind,
        base: &BaseCommission,
        rules: &[commission_rules::Model],
        stats: ProviderStats,
    ) -> CommissionBreakdown {
        let base_amount = base_amount.max(0);
        let raw_base = match base.kind {
            BaseCommissionType::Percentage => apply_bp(base_amount, base.value),
            BaseCommissionType::Fixed => base.value,
        };
        let base_commission = clamp_optional(raw_base, base.min, base.max);

        let surcharge = |rule: Option<&commission_rules::Model>| {
            rule.map(|r| clamp_optional(apply_bp(base_amount, r.rate_bp), r.min_amount, r.max_amount))
                .unwrap_or(0)
        };

        let service_type_rule = rules.iter().find(|r| {
            r.is_active
                && r.rule_type == CommissionRuleType::ServiceType
                && r.service_kind == Some(kind)
        });
        let volume_rule = Self::tier(rules, CommissionRuleType::VolumeTier, Some(stats.trailing_volume));
        let rating_rule = Self::tier(rules, CommissionRuleType::RatingTier, stats.rating_x100);

        let service_type_surcharge = surcharge(service_type_rule);
        let volume_surcharge = surcharge(volume_rule);
        let rating_surcharge = surcharge(rating_rule);

        let total_commission = (base_commission
            + service_type_surcharge
            + volume_surcharge
            + rating_surcharge)
            .clamp(0, base_amount);
        let points_value = points_value.max(0);

        CommissionBreakdown {
            base_amount,
            base_commission,
            service_type_surcharge,
            volume_surcharge,
            rating_surcharge,
            total_commission,
            points_value,
            platform_commission: (total_commission - points_value).max(0),
            provider_share: base_amount - total_commission,
        }
    }

    /// 门槛不超过 metric 的最高一档
    fn tier(
        rules: &[commission_rules::Model],
        rule_type: CommissionRuleType,
        metric: Option<i64>,
    ) -> Option<&commission_rules::Model> {
        let metric = metric?;
        rules
            .iter()
            .filter(|r| r.is_active && r.rule_type == rule_type && r.threshold <= metric)
            .max_by_key(|r| r.threshold)
    }

    /// 两个预订的佣金快照合并（批量餐饮订单）
    pub fn merge(a: CommissionBreakdown, b: CommissionBreakdown) -> CommissionBreakdown {
        CommissionBreakdown {
            base_amount: a.base_amount + b.base_amount,
            base_commission: a.base_commission + b.base_commission,
            service_type_surcharge: a.service_type_surcharge + b.service_type_surcharge,
            volume_surcharge: a.volume_surcharge + b.volume_surcharge,
            rating_surcharge: a.rating_surcharge + b.rating_surcharge,
            total_commission: a.total_commission + b.total_commission,
            points_value: a.points_value + b.points_value,
            platform_commission: a.platform_commission + b.platform_commission,
            provider_share: a.provider_share + b.provider_share,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(
        id: i64,
        rule_type: CommissionRuleType,
        kind: Option<ServiceKind>,
        threshold: i64,
        rate_bp: i64,
    ) -> commission_rules::Model {
        commission_rules::Model {
            id,
            rule_type,
            service_kind: kind,
            threshold,
            rate_bp,
            min_amount: None,
            max_amount: None,
            is_active: true,
        }
    }

    fn ten_percent() -> BaseCommission {
        BaseCommission {
            kind: BaseCommissionType::Percentage,
            value: 1_000,
            min: Some(0),
            max: None,
        }
    }

    #[test]
    fn test_base_percentage_only() {
        let b = CommissionService::compute(
            10_000,
            0,
            ServiceKind::Event,
            &ten_percent(),
            &[],
            ProviderStats::default(),
        );
        assert_eq!(b.total_commission, 1_000);
        assert_eq!(b.platform_commission, 1_000);
        assert_eq!(b.provider_share, 9_000);
    }

    #[test]
    fn test_layers_pick_matching_kind_and_highest_tier() {
        let rules = vec![
            rule(1, CommissionRuleType::ServiceType, Some(ServiceKind::Property), 0, 500),
            rule(2, CommissionRuleType::ServiceType, Some(ServiceKind::Event), 0, 200),
            rule(3, CommissionRuleType::VolumeTier, None, 0, 100),
            rule(4, CommissionRuleType::VolumeTier, None, 50_000, -300),
            rule(5, CommissionRuleType::RatingTier, None, 450, -100),
        ];
        let stats = ProviderStats {
            trailing_volume: 80_000,
            rating_x100: Some(470),
        };
        let b = CommissionService::compute(
            10_000,
            0,
            ServiceKind::Event,
            &ten_percent(),
            &rules,
            stats,
        );
        assert_eq!(b.service_type_surcharge, 200);
        assert_eq!(b.volume_surcharge, -300);
        assert_eq!(b.rating_surcharge, -100);
        assert_eq!(b.total_commission, 800);
    }

    #[test]
    fn test_caps_and_clamp_to_base() {
        let base = BaseCommission {
            kind: BaseCommissionType::Fixed,
            value: 5_000,
            min: None,
            max: Some(3_000),
        };
        let mut capped = rule(1, CommissionRuleType::ServiceType, Some(ServiceKind::Catering), 0, 9_000);
        capped.max_amount = Some(500);
        let b = CommissionService::compute(
            2_000,
            0,
            ServiceKind::Catering,
            &base,
            &[capped],
            ProviderStats::default(),
        );
        assert_eq!(b.base_commission, 3_000);
        assert_eq!(b.service_type_surcharge, 500);
        // 总额不超过基数
        assert_eq!(b.total_commission, 2_000);
        assert_eq!(b.provider_share, 0);
    }

    #[test]
    fn test_points_net_against_platform_commission_only() {
        let b = CommissionService::compute(
            10_000,
            1_500,
            ServiceKind::Event,
            &ten_percent(),
            &[],
            ProviderStats::default(),
        );
        assert_eq!(b.total_commission, 1_000);
        assert_eq!(b.platform_commission, 0);
        assert_eq!(b.provider_share, 9_000);
    }

    #[test]
    fn test_inactive_rules_are_ignored() {
        let mut inactive = rule(1, CommissionRuleType::VolumeTier, None, 0, 1_000);
        inactive.is_active = false;
        let b = CommissionService::compute(
            10_000,
            0,
            ServiceKind::Event,
            &ten_percent(),
            &[inactive],
            ProviderStats::default(),
        );
        assert_eq!(b.volume_surcharge, 0);
    }
}
