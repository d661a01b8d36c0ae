//! Time source for the engine.

use crate::domain::TimeMs;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Server-side notion of "now". Scoring deadlines and replay windows are
/// judged against this clock, never against client timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> TimeMs;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeMs {
        TimeMs::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: TimeMs) -> Self {
        Self {
            ms: AtomicI64::new(start.as_ms()),
        }
    }

    pub fn set(&self, at: TimeMs) {
        self.ms.store(at.as_ms(), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.ms.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeMs {
        TimeMs::new(self.ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(TimeMs::new(1_000));
        clock.advance_secs(2);
        clock.advance_ms(5);
        assert_eq!(clock.now().as_ms(), 3_005);
        clock.set(TimeMs::new(10));
        assert_eq!(clock.now().as_ms(), 10);
    }
}
