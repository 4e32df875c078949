//! System timer - monotonic tick source
//!
//! Ticks count whole tick periods since the timer was created. One tick is
//! 1 ms by default, matching a 1 kHz kernel tick; tests shrink the period to
//! keep wall time low.
//!
//! Author: Moroya Sakamoto

use std::thread;
use std::time::{Duration, Instant};

/// Default tick period (1 kHz)
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// System timer
///
/// `Copy`, so every task and queue carries its own handle to the same
/// origin.
#[derive(Debug, Clone, Copy)]
pub struct SysTimer {
    /// Tick zero
    origin: Instant,
    /// Length of one tick in nanoseconds (never zero)
    tick_ns: u64,
}

impl SysTimer {
    /// Create a timer with the given tick period
    pub fn new(tick: Duration) -> Self {
        let tick_ns = u64::try_from(tick.as_nanos()).unwrap_or(u64::MAX).max(1);
        Self {
            origin: Instant::now(),
            tick_ns,
        }
    }

    /// 1 tick = 1 ms
    pub fn millis() -> Self {
        Self::new(DEFAULT_TICK)
    }

    /// Timer with a tick period given in microseconds
    pub fn from_micros(tick_us: u64) -> Self {
        Self::new(Duration::from_micros(tick_us))
    }

    /// Current tick count
    pub fn now(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        elapsed / self.tick_ns
    }

    /// Length of one tick
    pub fn tick(&self) -> Duration {
        Duration::from_nanos(self.tick_ns)
    }

    /// Wall-clock length of `ticks`
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        Duration::from_nanos(self.tick_ns.saturating_mul(ticks))
    }

    /// Instant at which the counter reaches `tick`
    pub fn instant_at(&self, tick: u64) -> Instant {
        self.origin + self.ticks_to_duration(tick)
    }

    /// Elapsed ticks since a reference point
    pub fn elapsed_since(&self, reference: u64) -> u64 {
        self.now().saturating_sub(reference)
    }

    /// Relative timeout starting now
    pub fn deadline(&self, timeout: u64) -> Deadline {
        Deadline::new(self.now(), timeout)
    }

    /// Suspend the calling thread for `ticks`
    pub fn sleep(&self, ticks: u64) {
        if ticks > 0 {
            thread::sleep(self.ticks_to_duration(ticks));
        }
    }
}

impl Default for SysTimer {
    fn default() -> Self {
        Self::millis()
    }
}

/// Timeout window for a single blocking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Tick at which the call started
    start: u64,
    /// Absolute tick at which the call gives up
    deadline: u64,
}

impl Deadline {
    /// Create a deadline `timeout` ticks after `start`
    pub fn new(start: u64, timeout: u64) -> Self {
        Self {
            start,
            deadline: start.saturating_add(timeout),
        }
    }

    /// Tick the window opened at
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute expiry tick
    pub fn at(&self) -> u64 {
        self.deadline
    }

    /// Has the window closed?
    pub fn is_expired(&self, current: u64) -> bool {
        current >= self.deadline
    }

    /// Remaining ticks until expiry (0 once expired)
    pub fn remaining(&self, current: u64) -> u64 {
        self.deadline.saturating_sub(current)
    }

    /// Elapsed since start
    pub fn elapsed(&self, current: u64) -> u64 {
        current.saturating_sub(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion() {
        let timer = SysTimer::from_micros(250);
        assert_eq!(timer.tick(), Duration::from_micros(250));
        assert_eq!(timer.ticks_to_duration(4), Duration::from_millis(1));
    }

    #[test]
    fn test_zero_tick_is_clamped() {
        let timer = SysTimer::new(Duration::ZERO);
        assert_eq!(timer.tick(), Duration::from_nanos(1));
    }

    #[test]
    fn test_sleep_advances_ticks() {
        let timer = SysTimer::from_micros(100);
        let before = timer.now();
        timer.sleep(20);
        assert!(timer.elapsed_since(before) >= 20);
    }

    #[test]
    fn test_instant_at_matches_origin() {
        let timer = SysTimer::millis();
        let at = timer.instant_at(10);
        assert_eq!(at - timer.instant_at(0), Duration::from_millis(10));
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = Deadline::new(100, 50);
        assert_eq!(deadline.start(), 100);
        assert_eq!(deadline.at(), 150);
        assert!(!deadline.is_expired(149));
        assert!(deadline.is_expired(150));
    }

    #[test]
    fn test_deadline_remaining() {
        let deadline = Deadline::new(0, 1000);
        assert_eq!(deadline.remaining(500), 500);
        assert_eq!(deadline.remaining(1000), 0);
        assert_eq!(deadline.remaining(2000), 0);
        assert_eq!(deadline.elapsed(300), 300);
    }

    #[test]
    fn test_zero_timeout_is_already_expired() {
        let deadline = Deadline::new(42, 0);
        assert!(deadline.is_expired(42));
    }
}
