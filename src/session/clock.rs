//! Time source for the aggregator.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a replay loop can keep a handle while the
/// aggregator owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start the clock at the given instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Move the clock by `by`, saturating at the range chrono can represent.
    pub fn advance(&self, by: Duration) {
        self.advance_millis(by.num_milliseconds());
    }

    /// Move the clock forward by a number of seconds (fractions allowed).
    pub fn advance_secs(&self, secs: f64) {
        // `as` saturates; NaN becomes 0.
        self.advance_millis((secs * 1000.0).round() as i64);
    }

    fn advance_millis(&self, by: i64) {
        let min = DateTime::<Utc>::MIN_UTC.timestamp_millis();
        let max = DateTime::<Utc>::MAX_UTC.timestamp_millis();
        let mut current = self.millis.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(by).clamp(min, max);
            match self
                .millis
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let clock = ManualClock::starting_at(start);
        let handle = clock.clone();

        handle.advance_secs(2.5);
        assert_eq!(clock.now_millis(), 1_700_000_002_500);
        assert_eq!(clock.now(), start + Duration::milliseconds(2_500));
    }

    #[test]
    fn test_manual_clock_saturates() {
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let clock = ManualClock::starting_at(start);

        clock.advance_secs(1e16);
        assert_eq!(
            clock.now_millis(),
            DateTime::<Utc>::MAX_UTC.timestamp_millis()
        );
        assert_eq!(clock.now().timestamp_millis(), clock.now_millis());

        clock.advance_secs(f64::MAX);
        assert_eq!(
            clock.now_millis(),
            DateTime::<Utc>::MAX_UTC.timestamp_millis()
        );
    }
}
