//! Per-session inbound rate limiting.
//!
//! Tokens are refilled by `step` on every heartbeat tick and consumed by
//! every inbound data packet. The count stays within `[-window, window]`;
//! running into debt below zero drops packets and reaching `-window` kicks
//! the session.

use std::time::Duration;

/// Outcome of [`RateLimiter::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Process the packet.
    Allow,
    /// Drop the packet.
    Drop,
    /// Drop the packet and kick the session.
    Kick,
}

/// Token counter for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RateLimiter {
    tokens: i64,
    step: i64,
    window: i64,
}

impl RateLimiter {
    /// Limiter admitting `per_second` packets per second on average, or
    /// `None` when `per_second` is zero.
    ///
    /// The per-tick step is `per_second × interval`, rounded up and at
    /// least one. The window equals one step and the bucket starts full.
    pub(crate) fn new(per_second: u32, interval: Duration) -> Option<Self> {
        if per_second == 0 {
            return None;
        }
        let per_tick = u128::from(per_second) * interval.as_millis();
        let step = i64::try_from(per_tick.div_ceil(1000)).unwrap_or(i64::MAX).max(1);
        Some(Self {
            tokens: step,
            step,
            window: step,
        })
    }

    /// Add one step of tokens, capped at the window.
    pub(crate) fn refill(&mut self) { self.tokens = self.tokens.saturating_add(self.step).min(self.window); }

    /// Account for one inbound packet.
    pub(crate) fn admit(&mut self) -> Admission {
        if self.tokens > 0 {
            self.tokens -= 1;
            return Admission::Allow;
        }
        self.tokens = (self.tokens - 1).max(-self.window);
        if self.tokens <= -self.window {
            Admission::Kick
        } else {
            Admission::Drop
        }
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> i64 { self.tokens }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::{Admission, RateLimiter};

    #[rstest]
    #[case(10, Duration::from_secs(1), 10)]
    #[case(10, Duration::from_secs(5), 50)]
    #[case(3, Duration::from_millis(100), 1)]
    #[case(15, Duration::from_millis(100), 2)]
    fn step_scales_with_interval(#[case] rate: u32, #[case] interval: Duration, #[case] step: i64) {
        let limiter = RateLimiter::new(rate, interval).expect("enabled");
        assert_eq!(limiter.tokens(), step);
    }

    #[test]
    fn zero_rate_disables_limiting() { assert!(RateLimiter::new(0, Duration::from_secs(1)).is_none()); }

    #[test]
    fn burst_drops_then_kicks() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(1)).expect("enabled");
        assert_eq!(limiter.admit(), Admission::Allow);
        assert_eq!(limiter.admit(), Admission::Allow);
        assert_eq!(limiter.admit(), Admission::Drop);
        assert_eq!(limiter.admit(), Admission::Kick);
        assert_eq!(limiter.tokens(), -2);
        assert_eq!(limiter.admit(), Admission::Kick);
        assert_eq!(limiter.tokens(), -2);
    }

    #[test]
    fn refill_is_capped_at_window() {
        let mut limiter = RateLimiter::new(4, Duration::from_secs(1)).expect("enabled");
        for _ in 0..10 {
            limiter.refill();
        }
        assert_eq!(limiter.tokens(), 4);
    }

    #[test]
    fn sustained_rate_within_budget_never_drops() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1)).expect("enabled");
        for _ in 0..1000 {
            for _ in 0..5 {
                assert_eq!(limiter.admit(), Admission::Allow);
            }
            limiter.refill();
        }
    }

    #[test]
    fn debt_is_repaid_by_refills() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1)).expect("enabled");
        for _ in 0..4 {
            limiter.admit();
        }
        assert_eq!(limiter.tokens(), -1);
        limiter.refill();
        assert_eq!(limiter.tokens(), 2);
        assert_eq!(limiter.admit(), Admission::Allow);
    }
}
