//! # Circuit Breaker
//!
//! Stops polling for a cooldown window after too many consecutive failures.
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌────────────┐   failures >= threshold    ┌────────────────────────┐  │
//! │  │   CLOSED   │ ─────────────────────────► │  OPEN                  │  │
//! │  │            │                            │  until = now + reset   │  │
//! │  └─────▲──────┘                            └───────────┬────────────┘  │
//! │        │                                               │               │
//! │        │ record_success()                   now >= until               │
//! │        │ (failures = 0)                                │               │
//! │        │                                               ▼               │
//! │        │                                   ┌────────────────────────┐  │
//! │        └────────────────────────────────── │  TRIAL                 │  │
//! │                                            │  one poll allowed,     │  │
//! │                                            │  failures still >= thr │  │
//! │                                            └───────────┬────────────┘  │
//! │                                                        │               │
//! │                                     record_failure() → OPEN again      │
//! │                                     with a fresh cooldown              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Owned by the poll loop and mutated only from its task, so it carries no
//! lock of its own. Times are float seconds since the Unix epoch.

use std::time::Duration;

use serde::Serialize;

/// Default consecutive-failure threshold.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Default cooldown once open.
pub const DEFAULT_RESET: Duration = Duration::from_secs(60);

/// Externally visible phase of the breaker at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPhase {
    /// Polling allowed, below threshold.
    Closed,
    /// Polling suppressed until the cooldown ends.
    Open,
    /// Cooldown over but the failure count has not been cleared yet.
    Trial,
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerPhase::Closed => write!(f, "closed"),
            BreakerPhase::Open => write!(f, "open"),
            BreakerPhase::Trial => write!(f, "trial"),
        }
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    reset: Duration,
    consecutive_failures: u32,
    open_until_epoch_secs: f64,
}

impl CircuitBreaker {
    /// A zero threshold is treated as one.
    pub fn new(threshold: u32, reset: Duration) -> Self {
        CircuitBreaker {
            threshold: threshold.max(1),
            reset,
            consecutive_failures: 0,
            open_until_epoch_secs: 0.0,
        }
    }

    /// False while open and the cooldown has not elapsed.
    pub fn should_poll(&self, now: f64) -> bool {
        !(self.is_tripped() && now < self.open_until_epoch_secs)
    }

    /// Clears the failure count.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Counts one failure and opens (or re-opens) the breaker at the threshold.
    pub fn record_failure(&mut self, now: f64) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.is_tripped() {
            self.open_until_epoch_secs = now + self.reset.as_secs_f64();
        }
    }

    /// How long until polling is allowed again (zero if it already is).
    pub fn time_until_reset(&self, now: f64) -> Duration {
        if self.should_poll(now) {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((self.open_until_epoch_secs - now).max(0.0))
            .unwrap_or(Duration::MAX)
    }

    pub fn phase(&self, now: f64) -> BreakerPhase {
        if !self.is_tripped() {
            BreakerPhase::Closed
        } else if now < self.open_until_epoch_secs {
            BreakerPhase::Open
        } else {
            BreakerPhase::Trial
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn open_until_epoch_secs(&self) -> f64 {
        self.open_until_epoch_secs
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    fn is_tripped(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        CircuitBreaker::new(DEFAULT_THRESHOLD, DEFAULT_RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: f64 = 1_700_000_000.0;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(60))
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let mut b = breaker();
        for _ in 0..4 {
            b.record_failure(T0);
            assert!(b.should_poll(T0));
        }
        b.record_failure(T0);
        assert!(!b.should_poll(T0));
        assert!(!b.should_poll(T0 + 59.9));
        assert!(b.should_poll(T0 + 60.0));
        assert_eq!(b.phase(T0 + 1.0), BreakerPhase::Open);
    }

    #[test]
    fn test_success_resets_in_any_state() {
        let mut b = breaker();
        b.record_failure(T0);
        b.record_failure(T0);
        b.record_success();
        assert_eq!(b.consecutive_failures(), 0);

        for _ in 0..5 {
            b.record_failure(T0);
        }
        assert_eq!(b.phase(T0), BreakerPhase::Open);
        b.record_success();
        assert_eq!(b.consecutive_failures(), 0);
        assert!(b.should_poll(T0));
        assert_eq!(b.phase(T0), BreakerPhase::Closed);
    }

    #[test]
    fn test_trial_failure_reopens_with_fresh_cooldown() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure(T0);
        }

        let after_cooldown = T0 + 61.0;
        assert!(b.should_poll(after_cooldown));
        assert_eq!(b.phase(after_cooldown), BreakerPhase::Trial);

        b.record_failure(after_cooldown);
        assert!(!b.should_poll(after_cooldown));
        assert_eq!(b.open_until_epoch_secs(), after_cooldown + 60.0);
    }

    #[test]
    fn test_trial_without_outcome_stays_pollable() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure(T0);
        }
        // An empty tick records nothing; the next check still allows a poll.
        assert!(b.should_poll(T0 + 120.0));
        assert_eq!(b.consecutive_failures(), 5);
    }

    #[test]
    fn test_time_until_reset() {
        let mut b = breaker();
        assert_eq!(b.time_until_reset(T0), Duration::ZERO);
        for _ in 0..5 {
            b.record_failure(T0);
        }
        assert_eq!(b.time_until_reset(T0 + 20.0), Duration::from_secs(40));
        assert_eq!(b.time_until_reset(T0 + 60.0), Duration::ZERO);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let mut b = CircuitBreaker::new(1, Duration::from_secs(u64::MAX));
        b.record_failure(T0);
        assert!(!b.should_poll(T0 + 1.0));
        assert_eq!(b.time_until_reset(T0 + 1.0), Duration::MAX);
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let mut b = CircuitBreaker::new(0, Duration::from_secs(10));
        assert!(b.should_poll(T0));
        b.record_failure(T0);
        assert!(!b.should_poll(T0));
    }
}
