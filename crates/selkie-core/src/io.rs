//! I/O abstraction layer
//!
//! TigerStyle: All external I/O goes through abstraction traits.
//!
//! Two seams keep the runtime deterministic under test:
//!
//! - **Time**: wall clock vs simulated time. All pacing and timestamps go
//!   through [`Clock`]; never `Instant::now()` directly in runtime code.
//! - **Loading**: the OS dynamic-library primitive vs in-process factories.
//!   The registry only sees [`LibraryLoader`]/[`LoadedLibrary`].
//!
//! Production implementations live here (`WallClock`) and in
//! `selkie-loader` (`NativeLoader`); simulation implementations live in
//! `selkie-dst` (`SimClock`, `SimLoader`). The same runtime code runs
//! against both.

use crate::error::Result;
use crate::library::LibraryModule;
use std::fmt;
use std::path::Path;
use std::time::Instant;

// =============================================================================
// Clock
// =============================================================================

/// Monotonic time source used by the update scheduler and log relays
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic microseconds since an arbitrary origin
    fn now_us(&self) -> u64;

    /// Sleep for the given number of milliseconds
    ///
    /// In production this is a real thread sleep; in simulation it advances
    /// virtual time and returns immediately.
    fn sleep_ms(&self, ms: u64);

    /// Busy-poll until the clock reaches `deadline_us`
    ///
    /// The pacing loop uses this for the final sub-millisecond wait, where
    /// a sleep would overshoot. Simulated clocks override it to jump
    /// straight to the deadline.
    fn spin_until_us(&self, deadline_us: u64) {
        while self.now_us() < deadline_us {
            std::hint::spin_loop();
        }
    }

    /// Monotonic milliseconds since the clock origin
    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }
}

/// Production clock over `std::time::Instant`
#[derive(Debug)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

// =============================================================================
// Library Loading
// =============================================================================

/// The OS dynamic-library primitive, behind a trait
///
/// Implementations: `selkie-loader::NativeLoader` (dlopen via
/// `libloading`), `selkie-dst::SimLoader` (in-process factories).
pub trait LibraryLoader: Send + Sync {
    /// Open the library at `path`
    ///
    /// # Errors
    /// Returns `LibraryLoadFailed` when the target cannot be opened.
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>>;
}

/// An open OS library handle
///
/// Dropping the handle closes the library; the registry keeps it alive for
/// as long as the library is registered, since the module object's code
/// lives inside it.
pub trait LoadedLibrary: Send {
    /// The path the library was opened from
    fn path(&self) -> &Path;

    /// Resolve the well-known entry point and construct the root module
    ///
    /// # Errors
    /// - `EntryPointMissing` when the symbol is absent
    /// - `EntryPointNull` when the entry point returns a null root object
    fn entry_point(&self) -> Result<Box<dyn LibraryModule>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }

    #[test]
    fn test_wall_clock_sleep_advances() {
        let clock = WallClock::new();
        let before = clock.now_us();
        clock.sleep_ms(2);
        assert!(clock.now_us() >= before + 1_000);
    }

    #[test]
    fn test_spin_until_reaches_deadline() {
        let clock = WallClock::new();
        let deadline = clock.now_us() + 500;
        clock.spin_until_us(deadline);
        assert!(clock.now_us() >= deadline);
    }
}
