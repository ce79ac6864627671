//! Wall-clock helpers.
//!
//! Order bookkeeping (`Order::trade_time`, timeout sweeps) uses plain
//! milliseconds since the Unix epoch so values can be compared with the
//! timestamps the brokerage and the market-data bus send.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Milliseconds elapsed from `since_ms` to `now_ms`, saturating at zero when
/// the clocks disagree.
#[inline]
pub fn elapsed_ms(since_ms: u64, now_ms: u64) -> Duration {
    Duration::from_millis(now_ms.saturating_sub(since_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates() {
        assert_eq!(elapsed_ms(2_000, 1_000), Duration::ZERO);
        assert_eq!(elapsed_ms(1_000, 3_500), Duration::from_millis(2_500));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
