use crate::entities::setting_entity as settings;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::collections::HashMap;
use std::sync::RwLock;

pub const TAX_RATE: &str = "tax_rate";
pub const ALLOW_FREE_BOOKINGS: &str = "allow_free_bookings";
pub const POINTS_REDEEM_RATE: &str = "points_redeem_rate";
pub const POINTS_MAX_REDEEM_RATIO: &str = "points_max_redeem_ratio";
pub const POINTS_EARN_RATE: &str = "points_earn_rate";
pub const POINTS_EXPIRY_DAYS: &str = "points_expiry_days";
pub const COMMISSION_TYPE: &str = "commission_type";
pub const COMMISSION_VALUE: &str = "commission_value";
pub const COMMISSION_MIN: &str = "commission_min";
pub const COMMISSION_MAX: &str = "commission_max";

/// Key/value platform configuration (`get_setting` / `set_setting`).
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_setting(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()>;
}

/// Settings persisted in the `settings` table.
#[derive(Clone)]
pub struct DbSettings {
    pool: DatabaseConnection,
}

impl DbSettings {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsProvider for DbSettings {
    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        let row = settings::Entity::find_by_id(key.to_string())
            .one(&self.pool)
            .await?;
        Ok(row.map(|m| m.value))
    }

    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let model = settings::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };
        settings::Entity::insert(model)
            .on_conflict(
                OnConflict::column(settings::Column::Key)
                    .update_columns([settings::Column::Value, settings::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local settings, used by tests and tooling.
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
        self
    }
}

#[async_trait]
impl SettingsProvider for MemorySettings {
    async fn get_setting(&self, key: &str) -> AppResult<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| AppError::InternalError("settings lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| AppError::InternalError("settings lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseCommissionType {
    /// value in basis points of the commission base
    Percentage,
    /// value in cents
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseCommission {
    pub kind: BaseCommissionType,
    pub value: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Typed snapshot of the settings the booking core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSettings {
    pub tax_rate_bp: i64,
    pub allow_free_bookings: bool,
    /// cents credited per redeemed point
    pub points_redeem_rate: i64,
    pub points_max_redeem_ratio_bp: i64,
    /// points earned per currency unit (100 cents) paid
    pub points_earn_rate: i64,
    pub points_expiry_days: i64,
    pub commission: BaseCommission,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            tax_rate_bp: 0,
            allow_free_bookings: false,
            points_redeem_rate: 1,
            points_max_redeem_ratio_bp: 5_000,
            points_earn_rate: 1,
            points_expiry_days: 365,
            commission: BaseCommission {
                kind: BaseCommissionType::Percentage,
                value: 1_000,
                min: Some(0),
                max: None,
            },
        }
    }
}

impl PlatformSettings {
    pub async fn load(provider: &dyn SettingsProvider) -> AppResult<Self> {
        let defaults = Self::default();

        let tax_rate_bp = match provider.get_setting(TAX_RATE).await? {
            Some(v) => parse_percent_bp(TAX_RATE, &v)?,
            None => defaults.tax_rate_bp,
        };
        let allow_free_bookings = match provider.get_setting(ALLOW_FREE_BOOKINGS).await? {
            Some(v) => parse_bool(ALLOW_FREE_BOOKINGS, &v)?,
            None => defaults.allow_free_bookings,
        };
        let points_redeem_rate = match provider.get_setting(POINTS_REDEEM_RATE).await? {
            Some(v) => parse_int(POINTS_REDEEM_RATE, &v)?,
            None => defaults.points_redeem_rate,
        };
        let points_max_redeem_ratio_bp = match provider.get_setting(POINTS_MAX_REDEEM_RATIO).await?
        {
            Some(v) => parse_percent_bp(POINTS_MAX_REDEEM_RATIO, &v)?,
            None => defaults.points_max_redeem_ratio_bp,
        };
        let points_earn_rate = match provider.get_setting(POINTS_EARN_RATE).await? {
            Some(v) => parse_int(POINTS_EARN_RATE, &v)?,
            None => defaults.points_earn_rate,
        };
        let points_expiry_days = match provider.get_setting(POINTS_EXPIRY_DAYS).await? {
            Some(v) => parse_int(POINTS_EXPIRY_DAYS, &v)?,
            None => defaults.points_expiry_days,
        };

        let kind = match provider.get_setting(COMMISSION_TYPE).await?.as_deref() {
            Some("fixed") => BaseCommissionType::Fixed,
            Some("percentage") | None => BaseCommissionType::Percentage,
            Some(other) => {
                return Err(AppError::ConfigError(format!(
                    "{COMMISSION_TYPE} must be percentage or fixed, got {other}"
                )));
            }
        };
        let value = match provider.get_setting(COMMISSION_VALUE).await? {
            Some(v) if kind == BaseCommissionType::Percentage => {
                parse_percent_bp(COMMISSION_VALUE, &v)?
            }
            Some(v) => parse_int(COMMISSION_VALUE, &v)?,
            None if kind == BaseCommissionType::Percentage => defaults.commission.value,
            None => 0,
        };
        let min = match provider.get_setting(COMMISSION_MIN).await? {
            Some(v) => Some(parse_int(COMMISSION_MIN, &v)?),
            None => defaults.commission.min,
        };
        let max = match provider.get_setting(COMMISSION_MAX).await? {
            Some(v) if !v.trim().is_empty() => Some(parse_int(COMMISSION_MAX, &v)?),
            _ => None,
        };

        Ok(Self {
            tax_rate_bp,
            allow_free_bookings,
            points_redeem_rate,
            points_max_redeem_ratio_bp,
            points_earn_rate,
            points_expiry_days,
            commission: BaseCommission {
                kind,
                value,
                min,
                max,
            },
        })
    }
}

/// "15" -> 1500bp, "2.5" -> 250bp
pub fn parse_percent_bp(key: &str, raw: &str) -> AppResult<i64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::ConfigError(format!("{key} is not a number: {raw}")))?;
    if !(0.0..=100.0).contains(&value) {
        return Err(AppError::ConfigError(format!(
            "{key} must be between 0 and 100, got {raw}"
        )));
    }
    Ok((value * 100.0).round() as i64)
}

/// 管理端写入前校验，未知键原样保存
pub fn validate_setting(key: &str, raw: &str) -> AppResult<()> {
    let checked = match key {
        TAX_RATE | POINTS_MAX_REDEEM_RATIO => parse_percent_bp(key, raw).map(|_| ()),
        ALLOW_FREE_BOOKINGS => parse_bool(key, raw).map(|_| ()),
        POINTS_REDEEM_RATE | POINTS_EARN_RATE | POINTS_EXPIRY_DAYS | COMMISSION_MIN => {
            parse_int(key, raw).and_then(|v| non_negative(key, v))
        }
        COMMISSION_MAX if raw.trim().is_empty() => Ok(()),
        COMMISSION_MAX => parse_int(key, raw).and_then(|v| non_negative(key, v)),
        COMMISSION_TYPE => match raw {
            "percentage" | "fixed" => Ok(()),
            other => Err(AppError::ConfigError(format!(
                "{key} must be percentage or fixed, got {other}"
            ))),
        },
        COMMISSION_VALUE => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0)
            .map(|_| ())
            .ok_or_else(|| AppError::ConfigError(format!("{key} is not a valid amount: {raw}"))),
        _ => Ok(()),
    };
    checked.map_err(|e| match e {
        AppError::ConfigError(msg) => AppError::ValidationError(msg),
        other => other,
    })
}

fn non_negative(key: &str, value: i64) -> AppResult<()> {
    if value < 0 {
        return Err(AppError::ConfigError(format!("{key} must not be negative")));
    }
    Ok(())
}

fn parse_int(key: &str, raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ConfigError(format!("{key} is not an integer: {raw}")))
}

fn parse_bool(key: &str, raw: &str) -> AppResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AppError::ConfigError(format!("{key} is not a boolean: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_setting() {
        assert!(validate_setting(TAX_RATE, "8.25").is_ok());
        assert!(matches!(
            validate_setting(TAX_RATE, "120"),
            Err(AppError::ValidationError(_))
        ));
        assert!(validate_setting(ALLOW_FREE_BOOKINGS, "maybe").is_err());
        assert!(validate_setting(POINTS_EXPIRY_DAYS, "-1").is_err());
        assert!(validate_setting(COMMISSION_MAX, "").is_ok());
        assert!(validate_setting(COMMISSION_TYPE, "tiered").is_err());
        assert!(validate_setting("site_banner", "anything").is_ok());
    }

    #[test]
    fn test_parse_percent_bp() {
        assert_eq!(parse_percent_bp("k", "15").unwrap(), 1500);
        assert_eq!(parse_percent_bp("k", "2.5").unwrap(), 250);
        assert!(parse_percent_bp("k", "120").is_err());
        assert!(parse_percent_bp("k", "abc").is_err());
    }

    #[tokio::test]
    async fn test_load_platform_settings_from_provider() {
        let provider = MemorySettings::new()
            .with(TAX_RATE, "8.25")
            .with(ALLOW_FREE_BOOKINGS, "true")
            .with(COMMISSION_TYPE, "fixed")
            .with(COMMISSION_VALUE, "300")
            .with(COMMISSION_MAX, "1000");

        let settings = PlatformSettings::load(&provider).await.unwrap();
        assert_eq!(settings.tax_rate_bp, 825);
        assert!(settings.allow_free_bookings);
        assert_eq!(settings.commission.kind, BaseCommissionType::Fixed);
        assert_eq!(settings.commission.value, 300);
        assert_eq!(settings.commission.max, Some(1000));
        assert_eq!(settings.points_max_redeem_ratio_bp, 5_000);
    }

    #[tokio::test]
    async fn test_set_setting_overrides_value() {
        let provider = MemorySettings::new();
        provider.set_setting(TAX_RATE, "10").await.unwrap();
        assert_eq!(
            provider.get_setting(TAX_RATE).await.unwrap().as_deref(),
            Some("10")
        );
    }
}
