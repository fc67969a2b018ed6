//! Millisecond time sources
//!
//! Every timer, scheduler and coroutine registry reads time through a
//! [`ClockRef`]. [`SystemClock`] follows the monotonic wall clock;
//! [`ManualClock`] only moves when told to, which makes timer and scheduler
//! behaviour reproducible in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the current time in milliseconds
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds elapsed since the clock's origin
    fn now_ms(&self) -> u64;
}

/// Shared handle to a clock
pub type ClockRef = Arc<dyn Clock>;

/// Monotonic clock counting milliseconds since its creation
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Create a shareable system clock
    pub fn shared() -> ClockRef {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Virtual clock that advances only through [`ManualClock::advance`] or
/// [`ManualClock::set`]
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Create a shareable manual clock starting at `start_ms`
    pub fn shared(start_ms: u64) -> Arc<ManualClock> {
        Arc::new(Self::new(start_ms))
    }

    /// Move time forward, returning the new time
    pub fn advance(&self, ms: u64) -> u64 {
        self.now_ms.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Jump to an absolute time. Moving backwards is allowed but breaks
    /// monotonicity for anything already armed.
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(0);
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.advance(250), 250);
        assert_eq!(clock.now_ms(), 250);
        clock.set(1000);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_manual_clock_as_clock_ref() {
        let manual = ManualClock::shared(5);
        let clock: ClockRef = manual.clone();
        manual.advance(10);
        assert_eq!(clock.now_ms(), 15);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
