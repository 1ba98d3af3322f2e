//! Time source for the engine.
//!
//! All rate and peak-hour logic takes an explicit `now` (epoch millis) and asks
//! the clock which hour of the day that instant falls in, so simulated and real
//! time can be decoupled.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};

/// Source of the current time and of the hour-of-day mapping.
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> u64;

    /// Hour of day (0..=23) at `ms`.
    fn hour_at(&self, ms: u64) -> u32;
}

/// Wall clock; hours are taken in the host's local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn hour_at(&self, ms: u64) -> u32 {
        let millis = i64::try_from(ms).unwrap_or(i64::MAX);
        Local
            .timestamp_millis_opt(millis)
            .single()
            .map(|t| t.hour())
            .unwrap_or(0)
    }
}

/// Manually driven clock in UTC, for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// A clock set to 2026-01-05 at `hour`:00 UTC.
    pub fn at_hour(hour: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 5, hour.min(23), 0, 0)
            .single()
            .map(|t: DateTime<Utc>| t.timestamp_millis())
            .unwrap_or(0);
        Self::new(u64::try_from(start).unwrap_or(0))
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Release);
    }

    pub fn advance_ms(&self, delta: u64) {
        self.now_ms.fetch_add(delta, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }

    fn hour_at(&self, ms: u64) -> u32 {
        let millis = i64::try_from(ms).unwrap_or(i64::MAX);
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(|t| t.hour())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reports_hour_and_advances() {
        let clock = ManualClock::at_hour(15);
        let start = clock.now_ms();
        assert_eq!(clock.hour_at(start), 15);
        clock.advance_ms(60 * 60 * 1000);
        assert_eq!(clock.hour_at(clock.now_ms()), 16);
        clock.set_ms(start);
        assert_eq!(clock.now_ms(), start);
    }

    #[test]
    fn system_clock_hour_in_range() {
        let clock = SystemClock;
        assert!(clock.hour_at(clock.now_ms()) < 24);
    }
}
