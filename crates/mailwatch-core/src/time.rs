//! Time abstraction for testability.
//!
//! This module provides a `Clock` trait that abstracts over wall-clock time,
//! enabling deterministic testing of time-dependent behavior such as the
//! connection cooldown and search-window advancement.
//!
//! # Example
//!
//! ```
//! use mailwatch_core::time::{Clock, MockClock};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
//! clock.advance(Duration::minutes(5));
//! assert_eq!(clock.now(), Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 0).unwrap());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Abstraction over wall-clock time for testability.
///
/// In production, use [`SystemClock`] which delegates to [`Utc::now`].
/// In tests, use [`MockClock`] to control time deterministically.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock that uses real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A mock clock for testing time-dependent code.
///
/// The clock starts at a base time and can be advanced manually. This is
/// useful for testing the reconnect cooldown and day-boundary behavior of
/// the search window.
#[derive(Debug)]
pub struct MockClock {
    /// Base time (when the clock was created).
    base: DateTime<Utc>,
    /// Offset from base in milliseconds.
    offset_millis: AtomicI64,
}

impl MockClock {
    /// Creates a new mock clock starting at the given time.
    #[must_use]
    pub const fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            offset_millis: AtomicI64::new(0),
        }
    }

    /// Creates a mock clock that can be shared across tasks.
    #[must_use]
    pub fn shared(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(base))
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.offset_millis
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }

    /// Sets the clock to a specific time.
    pub fn set(&self, to: DateTime<Utc>) {
        let offset = to.signed_duration_since(self.base);
        self.offset_millis
            .store(offset.num_milliseconds(), Ordering::SeqCst);
    }

    /// Returns the current offset from the base time.
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::milliseconds(self.offset_millis.load(Ordering::SeqCst))
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + self.offset()
    }
}

impl Clock for Arc<MockClock> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let before = Utc::now();
        let from_clock = clock.now();
        let after = Utc::now();

        // Clock should return a time between before and after
        assert!(from_clock >= before);
        assert!(from_clock <= after);
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new(base());

        clock.advance(Duration::seconds(10));
        assert_eq!(clock.now(), base() + Duration::seconds(10));

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), base() + Duration::seconds(310));
    }

    #[test]
    fn test_mock_clock_set() {
        let clock = MockClock::new(base());
        let target = Utc.with_ymd_and_hms(2026, 3, 2, 0, 30, 0).unwrap();

        clock.set(target);
        assert_eq!(clock.now(), target);

        clock.advance(Duration::hours(1));
        assert_eq!(clock.now(), target + Duration::hours(1));
    }

    #[test]
    fn test_shared_mock_clock() {
        let clock = MockClock::shared(base());
        let clock2 = Arc::clone(&clock);

        clock2.advance(Duration::seconds(42));

        assert_eq!(clock.now(), base() + Duration::seconds(42));
        assert_eq!(clock2.now(), base() + Duration::seconds(42));
    }
}
