//! Adaptive linear-step retransmit backoff for `DATA`.
//!
//! The step-function formula below is intentional: constant timeout within
//! each age-step rather than exponential. The interaction with the
//! heartbeat interval is deliberate and should not be "improved" to
//! exponential backoff.

use std::time::Duration;

/// Floor on the retransmit timeout.
pub const MIN_FLOOR_MS: u64 = 75;
/// Ceiling on the retransmit timeout.
pub const MAX_CEILING_MS: u64 = 30_000;

/// `timeout(age) = clamp(min_to * (age / step), min_to, max_to)` where
/// `min_to = max(75ms, hb/2)`, `max_to = 30_000ms`, `step = max(min_to, hb)`.
///
/// Starts at `min_to`, then grows linearly in units of `min_to` per `step`,
/// capped at `max_to`.
#[must_use]
pub fn timeout(age: Duration, hb: Duration) -> Duration {
    let min_to = min_to(hb);
    let max_to = Duration::from_millis(MAX_CEILING_MS);
    let step = min_to.max(hb);

    let steps = (age.as_millis() / step.as_millis().max(1)) as u32;
    let scaled = min_to.saturating_mul(steps);

    scaled.clamp(min_to, max_to)
}

/// `min_to = max(75ms, hb/2)`, the retransmit floor and also the fixed
/// `READY_TO_COMMIT` retransmit cadence.
#[must_use]
pub fn min_to(hb: Duration) -> Duration {
    Duration::from_millis(MIN_FLOOR_MS).max(hb / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_age_is_min_to() {
        let hb = Duration::from_millis(1000);
        assert_eq!(timeout(Duration::ZERO, hb), Duration::from_millis(500));
    }

    #[test]
    fn grows_linearly_in_units_of_min_to_per_step() {
        let hb = Duration::from_millis(1000);
        // min_to = 500ms, step = max(500, 1000) = 1000ms.
        assert_eq!(timeout(Duration::from_millis(999), hb), Duration::from_millis(500));
        assert_eq!(timeout(Duration::from_millis(1000), hb), Duration::from_millis(500));
        assert_eq!(timeout(Duration::from_millis(2000), hb), Duration::from_millis(1000));
        assert_eq!(timeout(Duration::from_millis(5000), hb), Duration::from_millis(2500));
    }

    #[test]
    fn clamps_to_max_to() {
        let hb = Duration::from_millis(1000);
        assert_eq!(
            timeout(Duration::from_secs(3600), hb),
            Duration::from_millis(MAX_CEILING_MS)
        );
    }

    #[test]
    fn min_to_floor_applies_for_tiny_heartbeat() {
        let hb = Duration::from_millis(10);
        // min_to = max(75, 5) = 75ms.
        assert_eq!(timeout(Duration::ZERO, hb), Duration::from_millis(75));
    }
}
