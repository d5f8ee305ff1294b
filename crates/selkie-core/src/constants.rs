//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Identity Limits
// =============================================================================

/// Maximum length of a library name in bytes
pub const LIBRARY_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a manager name in bytes
pub const MANAGER_NAME_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// Update Scheduler Limits
// =============================================================================

/// Default maximum variable update rate in Hz (0 = uncapped)
pub const UPDATE_RATE_HZ_DEFAULT: u32 = 60;

/// Default fixed simulation step rate in Hz
pub const FIXED_RATE_HZ_DEFAULT: u32 = 40;

/// Maximum fixed-step budget a tick may accumulate
///
/// Caps the worst-case number of fixed updates a single tick can run after a
/// stall, at the cost of temporarily coarser step resolution.
pub const FIXED_STEPS_BUDGET_MAX: u32 = 8;

/// Fixed-step budget replenished at the start of every tick
pub const FIXED_STEPS_REPLENISH_PER_TICK: u32 = 2;

/// Number of recent frame deltas retained for rolling statistics
pub const FRAME_DELTA_HISTORY_COUNT: usize = 64;

/// Remaining wait below which pacing stops sleeping and busy-polls, in
/// microseconds
pub const PACING_SPIN_THRESHOLD_US: u64 = 2_000;

// =============================================================================
// Log Relay Limits
// =============================================================================

/// Maximum records the per-library log relay buffers before a logging
/// manager is bound; oldest records are dropped beyond this
pub const LOG_RELAY_BUFFER_COUNT_MAX: usize = 4_096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_limits_are_consistent() {
        assert!(FIXED_STEPS_REPLENISH_PER_TICK <= FIXED_STEPS_BUDGET_MAX);
        assert!(FIXED_RATE_HZ_DEFAULT > 0);
        assert!(FRAME_DELTA_HISTORY_COUNT > 0);
    }
}
