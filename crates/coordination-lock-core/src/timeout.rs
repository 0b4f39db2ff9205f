//! Timeout value helpers.

use std::time::Duration;
use tokio::time::Instant;

/// Represents a timeout duration for lock operations.
///
/// - `Some(duration)` - Wait up to this duration
/// - `None` or `Some(Duration::ZERO)` - Wait indefinitely
pub type Timeout = Option<Duration>;

/// Internal helper for timeout calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutValue {
    millis: i64, // -1 for infinite
}

impl TimeoutValue {
    pub const INFINITE: Self = Self { millis: -1 };

    pub fn is_infinite(&self) -> bool {
        self.millis < 0
    }

    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_infinite() {
            None
        } else {
            Some(Duration::from_millis(self.millis as u64))
        }
    }

    /// Returns the instant at which a wait started at `start` must give up,
    /// or `None` for an unbounded wait. Deadlines past the clock's range
    /// are unbounded too.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.as_duration().and_then(|d| start.checked_add(d))
    }
}

impl From<Option<Duration>> for TimeoutValue {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::INFINITE,
            Some(d) if d.is_zero() => Self::INFINITE,
            Some(d) => {
                // Round up so a sub-millisecond timeout still waits.
                let partial = u128::from(d.subsec_nanos() % 1_000_000 != 0);
                Self {
                    millis: (d.as_millis() + partial).min(i64::MAX as u128) as i64,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_none_are_unbounded() {
        assert!(TimeoutValue::from(None).is_infinite());
        assert!(TimeoutValue::from(Some(Duration::ZERO)).is_infinite());
    }

    #[test]
    fn test_bounded_deadline() {
        let value = TimeoutValue::from(Some(Duration::from_millis(250)));
        assert_eq!(value.as_duration(), Some(Duration::from_millis(250)));

        let start = Instant::now();
        assert_eq!(
            value.deadline_from(start),
            Some(start + Duration::from_millis(250))
        );
        assert_eq!(TimeoutValue::INFINITE.deadline_from(start), None);
    }

    #[test]
    fn test_sub_millisecond_timeouts_round_up() {
        let value = TimeoutValue::from(Some(Duration::from_micros(500)));
        assert!(!value.is_infinite());
        assert_eq!(value.as_duration(), Some(Duration::from_millis(1)));

        let value = TimeoutValue::from(Some(Duration::from_micros(2_001)));
        assert_eq!(value.as_duration(), Some(Duration::from_millis(3)));
    }
}
