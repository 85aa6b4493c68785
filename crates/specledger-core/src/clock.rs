//! Injectable time source.
//!
//! Every mutation in the store reads the current time through a [`Clock`], so
//! tests can pin timestamps (and therefore derived issue IDs) with
//! [`FixedClock`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock. Each call to `now` returns the current instant and
/// then advances it by `step` (zero by default).
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
            step: Duration::zero(),
        }
    }

    pub fn stepping(at: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(at),
            step,
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut cur = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *cur = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut cur = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *cur += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let mut cur = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let now = *cur;
        *cur += self.step;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let at = "2026-02-19T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now(), at + Duration::seconds(5));
    }

    #[test]
    fn stepping_clock_advances_per_call() {
        let at = "2026-02-19T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = FixedClock::stepping(at, Duration::milliseconds(1));
        let a = clock.now();
        let b = clock.now();
        assert_eq!(b - a, Duration::milliseconds(1));
    }
}
