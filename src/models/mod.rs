pub mod booking;
pub mod coupon;
pub mod escrow;
pub mod pagination;
pub mod points;
pub mod settings;
pub mod wallet;
pub mod webhook;

pub use booking::*;
pub use coupon::*;
pub use escrow::*;
pub use pagination::*;
pub use points::*;
pub use settings::*;
pub use wallet::*;
pub use webhook::*;
