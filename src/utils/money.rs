//! 金额均为美分 (i64)，比例为基点 (1% = 100bp)

pub const BP_SCALE: i64 = 10_000;

/// amount × bp / 10000，四舍五入到分
pub fn apply_bp(amount: i64, bp: i64) -> i64 {
    let product = amount as i128 * bp as i128;
    let half = BP_SCALE as i128 / 2;
    let rounded = if product >= 0 {
        (product + half) / BP_SCALE as i128
    } else {
        (product - half) / BP_SCALE as i128
    };
    rounded as i64
}

/// amount × percent / 100
pub fn apply_percent(amount: i64, percent: i32) -> i64 {
    apply_bp(amount, percent as i64 * 100)
}

pub fn clamp_optional(value: i64, min: Option<i64>, max: Option<i64>) -> i64 {
    let value = match min {
        Some(min) => value.max(min),
        None => value,
    };
    match max {
        Some(max) => value.min(max),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bp_rounds_half_up() {
        assert_eq!(apply_bp(10_000, 1_000), 1_000);
        assert_eq!(apply_bp(1_005, 5_000), 503);
        assert_eq!(apply_bp(333, 825), 27);
        assert_eq!(apply_bp(0, 1_500), 0);
    }

    #[test]
    fn test_apply_percent() {
        assert_eq!(apply_percent(20_000, 50), 10_000);
        assert_eq!(apply_percent(999, 25), 250);
    }

    #[test]
    fn test_clamp_optional() {
        assert_eq!(clamp_optional(5, Some(10), None), 10);
        assert_eq!(clamp_optional(50, None, Some(20)), 20);
        assert_eq!(clamp_optional(15, Some(10), Some(20)), 15);
    }
}
