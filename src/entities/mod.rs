pub mod bookings;
pub mod cache_versions;
pub mod cancellation_policies;
pub mod cancellation_policy_rules;
pub mod catering_addons;
pub mod caterings;
pub mod commission_rules;
pub mod coupon_redemptions;
pub mod coupons;
pub mod events;
pub mod invoices;
pub mod notifications;
pub mod orders;
pub mod payment_transactions;
pub mod points_ledger;
pub mod properties;
pub mod restaurants;
pub mod scheduled_jobs;
pub mod service_blocks;
pub mod services;
pub mod settings;
pub mod wallet_transactions;
pub mod wallets;

pub use bookings as booking_entity;
pub use cache_versions as cache_version_entity;
pub use cancellation_policies as cancellation_policy_entity;
pub use cancellation_policy_rules as cancellation_rule_entity;
pub use catering_addons as catering_addon_entity;
pub use caterings as catering_entity;
pub use commission_rules as commission_rule_entity;
pub use coupon_redemptions as coupon_redemption_entity;
pub use coupons as coupon_entity;
pub use events as event_entity;
pub use invoices as invoice_entity;
pub use notifications as notification_entity;
pub use orders as order_entity;
pub use payment_transactions as payment_transaction_entity;
pub use points_ledger as points_ledger_entity;
pub use properties as property_entity;
pub use restaurants as restaurant_entity;
pub use scheduled_jobs as scheduled_job_entity;
pub use service_blocks as service_block_entity;
pub use services as service_entity;
pub use settings as setting_entity;
pub use wallet_transactions as wallet_transaction_entity;
pub use wallets as wallet_entity;

pub use bookings::BookingStatus;
pub use commission_rules::CommissionRuleType;
pub use coupons::DiscountType;
pub use payment_transactions::{PaymentStatus, SettlementStatus};
pub use points_ledger::LedgerEntryType;
pub use scheduled_jobs::JobStatus;
pub use services::ServiceKind;
pub use wallets::WalletKind;
