//! # Clock
//!
//! Injectable time source. Everything that stamps `enqueued_at`, `stored_at`
//! or checks cache expiry asks a [`Clock`] instead of calling `Utc::now()`
//! directly, so expiry rules can be exercised without sleeping.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant truncated to the millisecond precision of the store.
    ///
    /// Use this for timestamps that are persisted and also kept in memory.
    fn now_millis(&self) -> DateTime<Utc> {
        self.now().trunc_subsecs(3)
    }
}

/// Wall clock backed by `Utc::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
///
/// ## Example
/// ```rust
/// use chrono::Duration;
/// use gobus_core::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let start = clock.now();
/// clock.advance(Duration::milliseconds(150));
/// assert_eq!(clock.now() - start, Duration::milliseconds(150));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    /// Jumps the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = instant;
    }
}

impl Default for ManualClock {
    /// Starts at a fixed, millisecond-aligned instant so persisted timestamps
    /// round-trip exactly.
    fn default() -> Self {
        let start = DateTime::from_timestamp_millis(1_760_000_000_000).unwrap_or_default();
        ManualClock::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::default();
        let start = clock.now();

        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_now_millis_drops_sub_millisecond_part() {
        let clock = ManualClock::default();
        clock.advance(Duration::nanoseconds(1_234_567));

        let truncated = clock.now_millis();
        assert_eq!(truncated.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(truncated.timestamp_millis(), clock.now().timestamp_millis());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
