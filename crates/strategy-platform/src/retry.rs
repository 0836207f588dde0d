use std::time::Duration;

/// Up to 5 attempts per adapter call (§4.3).
pub const MAX_ATTEMPTS: u32 = 5;

/// Delay before attempt `n` (n >= 2): `min(8, 2^(n-2))` seconds (§4.3).
pub fn backoff_delay(attempt: u32) -> Duration {
    debug_assert!(attempt >= 2);
    let exp = attempt - 2;
    let secs = 8u64.min(1u64 << exp.min(3));
    Duration::from_secs(secs)
}

/// HTTP statuses the adapter retries transparently (§4.3).
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps_at_eight_seconds() {
        assert_eq!(backoff_delay(2), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(4));
        assert_eq!(backoff_delay(5), Duration::from_secs(8));
    }

    #[test]
    fn retryable_statuses_match_the_spec_set() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200, 400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(status));
        }
    }
}
