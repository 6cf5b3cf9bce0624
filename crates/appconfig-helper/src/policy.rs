//! Staleness policy deciding when a refresh attempt is due.
//!
//! The policy keys off the instant of the last *attempt*, successful or not,
//! so a failing backend is retried at the configured cadence instead of on
//! every read.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when the last refresh attempt started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPolicyState {
    last_attempt_at: Option<Instant>,
}

impl RefreshPolicyState {
    /// State with no attempt recorded, so the first check is due.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt at `now`, regardless of its outcome.
    pub fn record_attempt(&mut self, now: Instant) {
        self.last_attempt_at = Some(now);
    }

    /// Start of the most recent attempt, if any.
    pub fn last_attempt_at(&self) -> Option<Instant> {
        self.last_attempt_at
    }
}

/// Decides whether the cached configuration is old enough to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    max_staleness: Duration,
}

impl RefreshPolicy {
    /// `max_staleness` of zero makes every check due.
    pub fn new(max_staleness: Duration) -> Self {
        Self { max_staleness }
    }

    /// Configured staleness bound.
    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    /// Returns `true` when no attempt was recorded yet or the last one is at
    /// least `max_staleness` old.
    pub fn is_due(&self, now: Instant, state: &RefreshPolicyState) -> bool {
        self.is_due_after(now, state.last_attempt_at)
    }

    /// Same as [`RefreshPolicy::is_due`] for a bare attempt instant, for
    /// callers that only hold a copy of it.
    pub fn is_due_after(&self, now: Instant, last_attempt_at: Option<Instant>) -> bool {
        match last_attempt_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.max_staleness,
        }
    }

    /// Time left until the next attempt becomes due (zero when already due).
    pub fn time_until_due(&self, now: Instant, state: &RefreshPolicyState) -> Duration {
        match state.last_attempt_at {
            None => Duration::ZERO,
            Some(last) => self
                .max_staleness
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_check_is_always_due() {
        let policy = RefreshPolicy::new(Duration::from_secs(300));
        let state = RefreshPolicyState::new();
        assert!(policy.is_due(Instant::now(), &state));
        assert_eq!(policy.time_until_due(Instant::now(), &state), Duration::ZERO);
    }

    #[test]
    fn due_exactly_at_the_staleness_bound() {
        let policy = RefreshPolicy::new(Duration::from_secs(60));
        let start = Instant::now();
        let mut state = RefreshPolicyState::new();
        state.record_attempt(start);

        assert!(!policy.is_due(start + Duration::from_secs(59), &state));
        assert!(!policy.is_due_after(start + Duration::from_secs(59), Some(start)));
        assert!(policy.is_due_after(start, None));
        assert!(policy.is_due(start + Duration::from_secs(60), &state));
        assert!(policy.is_due(start + Duration::from_secs(61), &state));
        assert_eq!(
            policy.time_until_due(start + Duration::from_secs(45), &state),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn zero_staleness_is_always_due() {
        let policy = RefreshPolicy::new(Duration::ZERO);
        let now = Instant::now();
        let mut state = RefreshPolicyState::new();
        state.record_attempt(now);
        assert!(policy.is_due(now, &state));
    }

    #[test]
    fn clock_reading_before_last_attempt_is_not_due() {
        let policy = RefreshPolicy::new(Duration::from_secs(10));
        let now = Instant::now();
        let mut state = RefreshPolicyState::new();
        state.record_attempt(now + Duration::from_secs(5));
        assert!(!policy.is_due(now, &state));
        assert_eq!(policy.time_until_due(now, &state), Duration::from_secs(10));
    }

    proptest! {
        /// `is_due` and `time_until_due` always agree.
        #[test]
        fn due_iff_no_time_remaining(staleness_ms in 0u64..10_000, elapsed_ms in 0u64..20_000) {
            let policy = RefreshPolicy::new(Duration::from_millis(staleness_ms));
            let start = Instant::now();
            let mut state = RefreshPolicyState::new();
            state.record_attempt(start);
            let now = start + Duration::from_millis(elapsed_ms);

            prop_assert_eq!(policy.is_due(now, &state), elapsed_ms >= staleness_ms);
            prop_assert_eq!(
                policy.is_due(now, &state),
                policy.time_until_due(now, &state).is_zero()
            );
        }
    }
}
