pub mod admin;
pub mod booking;
pub mod catalog;
pub mod coupon;
pub mod points;
pub mod wallet;
pub mod webhook;

pub use admin::admin_config;
pub use booking::booking_config;
pub use catalog::catalog_config;
pub use coupon::coupon_config;
pub use points::points_config;
pub use wallet::wallet_config;
pub use webhook::webhook_config;
