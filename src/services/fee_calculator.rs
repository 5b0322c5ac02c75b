//! 费用计算
//!
//! 每种服务类型一个定价策略（小计 + 占用单位），随后统一计算
//! 优惠 -> 税 -> 积分抵扣 -> 应付总额。

use crate::entities::{
    catering_addon_entity as catering_addons, catering_entity as caterings,
    event_entity as events, property_entity as properties, restaurant_entity as restaurants,
};
use crate::error::{AppError, AppResult};
use crate::models::{BookingDetailsInput, Fulfillment};
use crate::services::catalog_service::ServiceDetail;
use crate::services::settings_service::PlatformSettings;
use crate::utils::apply_bp;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_NIGHT: i64 = 24 * 3600;

pub trait FeeCalculationStrategy {
    /// 校验明细，返回本次占用的容量单位
    fn units(&self, details: &BookingDetailsInput) -> AppResult<i32>;

    fn subtotal(
        &self,
        details: &BookingDetailsInput,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> AppResult<i64>;
}

fn positive(value: Option<i32>, field: &str) -> AppResult<i32> {
    match value {
        Some(v) if v > 0 => Ok(v),
        Some(_) => Err(AppError::ValidationError(format!("{field} must be positive"))),
        None => Err(AppError::ValidationError(format!("{field} is required"))),
    }
}

pub struct EventPricing<'a>(pub &'a events::Model);

impl FeeCalculationStrategy for EventPricing<'_> {
    fn units(&self, details: &BookingDetailsInput) -> AppResult<i32> {
        let people = positive(details.people, "people")?;
        if people > self.0.max_individuals {
            return Err(AppError::CapacityExceeded(format!(
                "Event admits at most {} people",
                self.0.max_individuals
            )));
        }
        Ok(people)
    }

    fn subtotal(
        &self,
        details: &BookingDetailsInput,
        _starts_at: DateTime<Utc>,
        _ends_at: DateTime<Utc>,
    ) -> AppResult<i64> {
        Ok(self.0.price_per_person * self.units(details)? as i64)
    }
}

pub struct CateringPricing<'a> {
    pub catering: &'a caterings::Model,
    pub addons: &'a [catering_addons::Model],
}

impl CateringPricing<'_> {
    fn addon_unit_price(&self, addon_ids: &[i64]) -> AppResult<i64> {
        addon_ids.iter().try_fold(0i64, |acc, id| {
            let addon = self
                .addons
                .iter()
                .find(|a| a.id == *id)
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "Add-on {id} does not belong to service {}",
                        self.catering.service_id
                    ))
                })?;
            Ok(acc + addon.price)
        })
    }

    fn fulfillment(&self, details: &BookingDetailsInput) -> AppResult<Fulfillment> {
        let fulfillment = details
            .fulfillment
            .ok_or_else(|| AppError::InvalidFulfillment("fulfillment is required".into()))?;
        match fulfillment {
            Fulfillment::Delivery if !self.catering.allows_delivery => Err(
                AppError::InvalidFulfillment("Delivery is not offered for this service".into()),
            ),
            Fulfillment::Pickup if !self.catering.allows_pickup => Err(
                AppError::InvalidFulfillment("Pickup is not offered for this service".into()),
            ),
            Fulfillment::Delivery
                if details
                    .delivery_address
                    .as_deref()
                    .is_none_or(|a| a.trim().is_empty()) =>
            {
                Err(AppError::InvalidFulfillment(
                    "delivery_address is required for delivery".into(),
                ))
            }
            other => Ok(other),
        }
    }
}

impl FeeCalculationStrategy for CateringPricing<'_> {
    fn units(&self, details: &BookingDetailsInput) -> AppResult<i32> {
        let quantity = positive(details.quantity, "quantity")?;
        if quantity < self.catering.min_order_qty {
            return Err(AppError::ValidationError(format!(
                "Minimum order quantity is {}",
                self.catering.min_order_qty
            )));
        }
        self.fulfillment(details)?;
        Ok(quantity)
    }

    fn subtotal(
        &self,
        details: &BookingDetailsInput,
        _starts_at: DateTime<Utc>,
        _ends_at: DateTime<Utc>,
    ) -> AppResult<i64> {
        let quantity = self.units(details)? as i64;
        let addons = self.addon_unit_price(&details.addon_ids)?;
        let delivery = match self.fulfillment(details)? {
            Fulfillment::Delivery => self.catering.delivery_fee,
            Fulfillment::Pickup => 0,
        };
        Ok((self.catering.price_per_unit + addons) * quantity + delivery)
    }
}

pub struct RestaurantPricing<'a>(pub &'a restaurants::Model);

impl FeeCalculationStrategy for RestaurantPricing<'_> {
    fn units(&self, details: &BookingDetailsInput) -> AppResult<i32> {
        let guests = positive(details.guests, "guests")?;
        if guests > self.0.max_guests {
            return Err(AppError::CapacityExceeded(format!(
                "Restaurant seats at most {} guests",
                self.0.max_guests
            )));
        }
        Ok(guests)
    }

    fn subtotal(
        &self,
        details: &BookingDetailsInput,
        _starts_at: DateTime<Utc>,
        _ends_at: DateTime<Utc>,
    ) -> AppResult<i64> {
        let guests = self.units(details)? as i64;
        Ok(self.0.price_per_guest * guests + self.0.reservation_fee)
    }
}

pub struct PropertyPricing<'a>(pub &'a properties::Model);

impl PropertyPricing<'_> {
    pub fn nights(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> i64 {
        let seconds = (ends_at - starts_at).num_seconds().max(0);
        ((seconds + SECONDS_PER_NIGHT - 1) / SECONDS_PER_NIGHT).max(1)
    }
}

impl FeeCalculationStrategy for PropertyPricing<'_> {
    fn units(&self, details: &BookingDetailsInput) -> AppResult<i32> {
        let adults = positive(details.adults, "adults")?;
        let children = details.children.unwrap_or(0);
        if children < 0 {
            return Err(AppError::ValidationError("children must not be negative".into()));
        }
        if adults > self.0.max_adults {
            return Err(AppError::CapacityExceeded(format!(
                "Property hosts at most {} adults",
                self.0.max_adults
            )));
        }
        if children > self.0.max_children {
            return Err(AppError::CapacityExceeded(format!(
                "Property hosts at most {} children",
                self.0.max_children
            )));
        }
        // 整套独占
        Ok(1)
    }

    fn subtotal(
        &self,
        details: &BookingDetailsInput,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> AppResult<i64> {
        self.units(details)?;
        Ok(self.0.nightly_rate * Self::nights(starts_at, ends_at) + self.0.cleaning_fee)
    }
}

impl ServiceDetail {
    pub fn pricing(&self) -> Box<dyn FeeCalculationStrategy + '_> {
        match self {
            ServiceDetail::Event(event) => Box::new(EventPricing(event)),
            ServiceDetail::Catering { catering, addons } => {
                Box::new(CateringPricing { catering, addons })
            }
            ServiceDetail::Restaurant(restaurant) => Box::new(RestaurantPricing(restaurant)),
            ServiceDetail::Property(property) => Box::new(PropertyPricing(property)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub subtotal: i64,
    pub discount: i64,
    /// subtotal - discount
    pub taxable: i64,
    pub tax: i64,
    pub points_used: i64,
    pub points_value: i64,
    pub total: i64,
}

pub struct FeeCalculator;

impl FeeCalculator {
    /// 优惠 -> 税 -> 积分。
    /// 积分抵扣上限为 (taxable + tax) × points_max_redeem_ratio，超出部分按上限削减积分数。
    pub fn compute_totals(
        subtotal: i64,
        discount: i64,
        requested_points: i64,
        available_points: i64,
        settings: &PlatformSettings,
    ) -> AppResult<FeeBreakdown> {
        if subtotal < 0 {
            return Err(AppError::ValidationError("subtotal must not be negative".into()));
        }
        if requested_points < 0 {
            return Err(AppError::ValidationError(
                "points_to_use must not be negative".into(),
            ));
        }
        if requested_points > available_points {
            return Err(AppError::InsufficientPoints {
                requested: requested_points,
                available: available_points.max(0),
            });
        }

        let discount = discount.clamp(0, subtotal);
        let taxable = subtotal - discount;
        let tax = apply_bp(taxable, settings.tax_rate_bp);
        let gross = taxable + tax;

        let (points_used, points_value) = if requested_points == 0 || settings.points_redeem_rate <= 0
        {
            (0, 0)
        } else {
            let cap_value = apply_bp(gross, settings.points_max_redeem_ratio_bp);
            let max_points = cap_value / settings.points_redeem_rate;
            let used = requested_points.min(max_points);
            (used, used * settings.points_redeem_rate)
        };

        Ok(FeeBreakdown {
            subtotal,
            discount,
            taxable,
            tax,
            points_used,
            points_value,
            total: gross - points_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catering() -> caterings::Model {
        caterings::Model {
            service_id: 7,
            price_per_unit: 1_200,
            stock: 10,
            min_order_qty: 2,
            allows_delivery: true,
            allows_pickup: false,
            delivery_fee: 500,
        }
    }

    fn addon(id: i64, price: i64) -> catering_addons::Model {
        catering_addons::Model {
            id,
            service_id: 7,
            name: format!("addon-{id}"),
            price,
        }
    }

    fn at(hour: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_800_000_000 + hour * 3600, 0).unwrap()
    }

    #[test]
    fn test_event_subtotal_per_person() {
        let event = events::Model {
            service_id: 1,
            price_per_person: 2_500,
            max_individuals: 50,
        };
        let details = BookingDetailsInput {
            people: Some(4),
            ..Default::default()
        };
        let pricing = EventPricing(&event);
        assert_eq!(pricing.units(&details).unwrap(), 4);
        assert_eq!(pricing.subtotal(&details, at(0), at(2)).unwrap(), 10_000);
    }

    #[test]
    fn test_catering_subtotal_with_addons_and_delivery() {
        let catering = catering();
        let addons = vec![addon(1, 300), addon(2, 100)];
        let pricing = CateringPricing {
            catering: &catering,
            addons: &addons,
        };
        let details = BookingDetailsInput {
            quantity: Some(3),
            addon_ids: vec![1, 2],
            fulfillment: Some(Fulfillment::Delivery),
            delivery_address: Some("1 Main St".into()),
            ..Default::default()
        };
        // (1200 + 400) * 3 + 500
        assert_eq!(pricing.subtotal(&details, at(0), at(1)).unwrap(), 5_300);
    }

    #[test]
    fn test_catering_rejects_disallowed_fulfillment_and_foreign_addon() {
        let catering = catering();
        let addons = vec![addon(1, 300)];
        let pricing = CateringPricing {
            catering: &catering,
            addons: &addons,
        };
        let pickup = BookingDetailsInput {
            quantity: Some(3),
            fulfillment: Some(Fulfillment::Pickup),
            ..Default::default()
        };
        assert!(matches!(
            pricing.units(&pickup),
            Err(AppError::InvalidFulfillment(_))
        ));

        let foreign = BookingDetailsInput {
            quantity: Some(3),
            addon_ids: vec![99],
            fulfillment: Some(Fulfillment::Delivery),
            delivery_address: Some("1 Main St".into()),
            ..Default::default()
        };
        assert!(matches!(
            pricing.subtotal(&foreign, at(0), at(1)),
            Err(AppError::ValidationError(_))
        ));

        let too_few = BookingDetailsInput {
            quantity: Some(1),
            fulfillment: Some(Fulfillment::Delivery),
            delivery_address: Some("1 Main St".into()),
            ..Default::default()
        };
        assert!(pricing.units(&too_few).is_err());
    }

    #[test]
    fn test_restaurant_includes_reservation_fee() {
        let restaurant = restaurants::Model {
            service_id: 3,
            price_per_guest: 0,
            reservation_fee: 0,
            max_guests: 20,
        };
        let details = BookingDetailsInput {
            guests: Some(2),
            ..Default::default()
        };
        assert_eq!(
            RestaurantPricing(&restaurant)
                .subtotal(&details, at(0), at(2))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_property_nights_round_up() {
        assert_eq!(PropertyPricing::nights(at(0), at(24)), 1);
        assert_eq!(PropertyPricing::nights(at(0), at(30)), 2);
        assert_eq!(PropertyPricing::nights(at(0), at(3)), 1);

        let property = properties::Model {
            service_id: 4,
            nightly_rate: 10_000,
            cleaning_fee: 2_000,
            max_adults: 2,
            max_children: 1,
        };
        let details = BookingDetailsInput {
            adults: Some(2),
            children: Some(1),
            ..Default::default()
        };
        assert_eq!(
            PropertyPricing(&property)
                .subtotal(&details, at(0), at(72))
                .unwrap(),
            32_000
        );

        let crowded = BookingDetailsInput {
            adults: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            PropertyPricing(&property).units(&crowded),
            Err(AppError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_totals_order_discount_tax_points() {
        let settings = PlatformSettings {
            tax_rate_bp: 1_000,
            points_redeem_rate: 1,
            points_max_redeem_ratio_bp: 5_000,
            ..Default::default()
        };
        let fees = FeeCalculator::compute_totals(10_000, 2_000, 100, 500, &settings).unwrap();
        assert_eq!(fees.taxable, 8_000);
        assert_eq!(fees.tax, 800);
        assert_eq!(fees.points_value, 100);
        assert_eq!(fees.total, 8_700);
    }

    #[test]
    fn test_points_capped_by_redeem_ratio() {
        let settings = PlatformSettings {
            points_redeem_rate: 10,
            points_max_redeem_ratio_bp: 5_000,
            ..Default::default()
        };
        // 上限 5000 分 -> 最多 500 积分
        let fees = FeeCalculator::compute_totals(10_000, 0, 2_000, 5_000, &settings).unwrap();
        assert_eq!(fees.points_used, 500);
        assert_eq!(fees.points_value, 5_000);
        assert_eq!(fees.total, 5_000);
    }

    #[test]
    fn test_requesting_more_points_than_balance_fails() {
        let err = FeeCalculator::compute_totals(10_000, 0, 50, 10, &PlatformSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientPoints {
                requested: 50,
                available: 10
            }
        ));
    }
}
