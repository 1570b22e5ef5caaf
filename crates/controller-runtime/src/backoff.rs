//! Capped exponential backoff for failed reconciles (spec §4.2: "a
//! controller that returns an error is retried with capped exponential
//! backoff").

use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const MAX: Duration = Duration::from_secs(300);
const MAX_SHIFT: u32 = 8;

/// The delay before the `attempt`-th retry (1-indexed: `attempt == 1` is the
/// first retry after an initial failure).
pub fn delay_for_attempt(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_SHIFT);
    BASE.saturating_mul(1u32 << shift).min(MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_then_caps() {
        assert_eq!(delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(delay_for_attempt(20), MAX);
    }
}
