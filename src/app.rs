//! 服务装配：main 与集成测试共用

use crate::config::PaymentConfig;
use crate::external::StripeGateway;
use crate::services::*;
use actix_web::web;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppServices {
    pub payment_config: PaymentConfig,
    pub settings: Arc<dyn SettingsProvider>,
    pub wallet_service: WalletService,
    pub payment_service: PaymentService,
    pub escrow_service: EscrowService,
    pub points_service: PointsLedgerService,
    pub coupon_service: CouponService,
    pub notification_service: NotificationService,
    pub availability_service: AvailabilityService,
    pub cancellation_service: CancellationService,
    pub booking_service: BookingService,
    pub job_queue: JobQueue,
}

impl AppServices {
    pub fn build(pool: DatabaseConnection, payment_config: &PaymentConfig) -> Self {
        let settings: Arc<dyn SettingsProvider> = Arc::new(DbSettings::new(pool.clone()));
        Self::with_settings(pool, payment_config, settings)
    }

    pub fn with_settings(
        pool: DatabaseConnection,
        payment_config: &PaymentConfig,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        let mut payment_service = PaymentService::new(pool.clone(), payment_config.currency.clone())
            .with_method(Arc::new(WalletPaymentMethod::new(pool.clone())));
        if !payment_config.secret_key.is_empty() {
            let gateway = Arc::new(StripeGateway::new(payment_config));
            payment_service =
                payment_service.with_method(Arc::new(GatewayPaymentMethod::new(gateway, pool.clone())));
        } else {
            log::warn!("payment gateway secret key not configured, gateway payments disabled");
        }
        if payment_config.allow_test_payments {
            log::warn!("test payment method enabled");
            payment_service =
                payment_service.with_method(Arc::new(TestPaymentMethod::new(pool.clone())));
        }

        let wallet_service = WalletService::new(pool.clone());
        let escrow_service =
            EscrowService::new(pool.clone(), payment_service.clone(), wallet_service.clone());
        let points_service = PointsLedgerService::new(pool.clone());
        let coupon_service = CouponService::new(pool.clone());
        let notification_service = NotificationService::new(pool.clone());
        let availability_service = AvailabilityService::new(pool.clone());
        let job_queue = JobQueue::new(pool.clone());

        let cancellation_service = CancellationService::new(
            pool.clone(),
            settings.clone(),
            escrow_service.clone(),
            points_service.clone(),
            notification_service.clone(),
        );
        let booking_service = BookingService::new(
            pool,
            settings.clone(),
            payment_service.clone(),
            escrow_service.clone(),
            points_service.clone(),
            coupon_service.clone(),
            notification_service.clone(),
        );

        Self {
            payment_config: payment_config.clone(),
            settings,
            wallet_service,
            payment_service,
            escrow_service,
            points_service,
            coupon_service,
            notification_service,
            availability_service,
            cancellation_service,
            booking_service,
            job_queue,
        }
    }

    /// 注册 app_data
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.payment_config.clone()))
            .app_data(web::Data::from(self.settings.clone()))
            .app_data(web::Data::new(self.wallet_service.clone()))
            .app_data(web::Data::new(self.payment_service.clone()))
            .app_data(web::Data::new(self.escrow_service.clone()))
            .app_data(web::Data::new(self.points_service.clone()))
            .app_data(web::Data::new(self.coupon_service.clone()))
            .app_data(web::Data::new(self.availability_service.clone()))
            .app_data(web::Data::new(self.cancellation_service.clone()))
            .app_data(web::Data::new(self.booking_service.clone()));
    }
}
