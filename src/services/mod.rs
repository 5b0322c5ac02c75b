pub mod availability_service;
pub mod booking_service;
pub mod cancellation_service;
pub mod catalog_service;
pub mod commission_service;
pub mod coupon_service;
pub mod escrow_service;
pub mod fee_calculator;
pub mod job_queue;
pub mod notification_service;
pub mod order_factory;
pub mod payment_service;
pub mod points_ledger_service;
pub mod settings_service;
pub mod wallet_service;

pub use availability_service::*;
pub use booking_service::*;
pub use cancellation_service::*;
pub use catalog_service::*;
pub use commission_service::*;
pub use coupon_service::*;
pub use escrow_service::*;
pub use fee_calculator::*;
pub use job_queue::*;
pub use notification_service::*;
pub use order_factory::*;
pub use payment_service::*;
pub use points_ledger_service::*;
pub use settings_service::*;
pub use wallet_service::*;
