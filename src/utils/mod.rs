pub mod code_generator;
pub mod jwt;
pub mod money;
pub mod signature;

pub use code_generator::{generate_booking_reference, generate_invoice_number, generate_order_number};
pub use jwt::*;
pub use money::{apply_bp, apply_percent, clamp_optional};
pub use signature::{
    DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, sign_payload, signature_header, verify_signature,
};
