//! Deterministic clock for simulation
//!
//! TigerStyle: Explicit time control, no system time dependencies.

use selkie_core::io::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Deterministic simulation clock
///
/// Time only advances when explicitly told to, or when runtime code sleeps
/// or busy-polls through the [`Clock`] seam: `sleep_ms` advances virtual
/// time by the requested amount and returns immediately, `spin_until_us`
/// jumps straight to the deadline. This keeps the pacing loop fully
/// deterministic in tests.
#[derive(Debug, Default)]
pub struct SimClock {
    current_us: AtomicU64,
}

impl SimClock {
    /// Create a clock starting at zero microseconds
    pub fn new() -> Self {
        Self {
            current_us: AtomicU64::new(0),
        }
    }

    /// Create a shared clock starting at zero microseconds
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a clock starting at a specific microsecond timestamp
    pub fn from_micros(us: u64) -> Self {
        Self {
            current_us: AtomicU64::new(us),
        }
    }

    /// Advance virtual time by the given number of microseconds
    pub fn advance_us(&self, us: u64) {
        self.current_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Advance virtual time by the given number of milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1_000);
    }

    /// Set the current virtual time (must not move backwards)
    pub fn set_us(&self, us: u64) {
        debug_assert!(
            us >= self.current_us.load(Ordering::SeqCst),
            "cannot go back in time"
        );
        self.current_us.store(us, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.current_us.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance_ms(ms);
    }

    fn spin_until_us(&self, deadline_us: u64) {
        // Jump straight to the deadline instead of spinning.
        let mut current = self.current_us.load(Ordering::SeqCst);
        while current < deadline_us {
            match self.current_us.compare_exchange(
                current,
                deadline_us,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_only_advances_when_told() {
        let clock = SimClock::new();
        assert_eq!(clock.now_us(), 0);
        clock.advance_ms(5);
        assert_eq!(clock.now_us(), 5_000);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_sleep_advances_virtual_time() {
        let clock = SimClock::new();
        clock.sleep_ms(16);
        assert_eq!(clock.now_us(), 16_000);
    }

    #[test]
    fn test_spin_jumps_to_deadline() {
        let clock = SimClock::from_micros(1_000);
        clock.spin_until_us(2_500);
        assert_eq!(clock.now_us(), 2_500);

        // A deadline in the past does not move time backwards.
        clock.spin_until_us(100);
        assert_eq!(clock.now_us(), 2_500);
    }
}
