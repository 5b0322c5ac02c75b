use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect()
}

/// 预订号，如 BK-20250901-7QX2KD
pub fn generate_booking_reference() -> String {
    format!("BK-{}-{}", Utc::now().format("%Y%m%d"), random_suffix(6))
}

/// 订单号
pub fn generate_order_number() -> String {
    format!("OR-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), random_suffix(6))
}

/// 发票号
pub fn generate_invoice_number() -> String {
    format!("IN-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), random_suffix(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_reference_format() {
        let reference = generate_booking_reference();
        assert!(reference.starts_with("BK-"));
        assert_eq!(reference.len(), 3 + 8 + 1 + 6);
        assert!(
            reference[12..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_order_numbers_differ() {
        // 理论上可能相同，概率极低
        assert_ne!(generate_order_number(), generate_order_number());
    }
}
