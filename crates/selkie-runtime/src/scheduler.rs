//! Update scheduler
//!
//! TigerStyle: Bounded catch-up, explicit pacing, deterministic under
//! simulated time.
//!
//! Drives one tick: pace to the configured maximum update rate, apply the
//! coordinator's staged changes, then dispatch the four update phases to a
//! snapshot of the active set: `pre_update`, the bounded fixed-step loop,
//! `update`, `post_update`, in that order.
//!
//! Pacing sleeps in whole-millisecond chunks while the remaining wait is
//! two milliseconds or more, then busy-polls the clock for the final
//! stretch. Realized deltas feed a fixed-size ring buffer reporting rolling
//! average/min/max.
//!
//! The fixed-step loop is the spiral-of-death guard: a budget capped at
//! `fixed_steps_budget_max` and replenished every tick bounds the number of
//! fixed updates a single tick may run. When the elapsed virtual time needs
//! more iterations than the budget allows, the step is recomputed coarser
//! so the same elapsed time is consumed within the budget.

use crate::coordinator::ActivationCoordinator;
use selkie_core::config::{UpdateConfig, PROPERTY_FIXED_RATE_HZ, PROPERTY_UPDATE_RATE_HZ_MAX};
use selkie_core::constants::{FRAME_DELTA_HISTORY_COUNT, PACING_SPIN_THRESHOLD_US};
use selkie_core::io::Clock;
use selkie_core::properties::{PropertyObserver, PropertyValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace, warn};

// =============================================================================
// Fixed-Step Planning
// =============================================================================

/// One tick's fixed-update plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStepPlan {
    /// Iterations to run this tick (never exceeds the remaining budget)
    pub iterations: u32,
    /// Step size per iteration in microseconds
    pub step_us: u64,
}

/// Plan the fixed-step iterations for one tick
///
/// `elapsed_us` is the virtual time since the last fixed update, `step_us`
/// the nominal step, `budget` the remaining iterations this tick may spend.
/// When the elapsed time needs more iterations than the budget allows, the
/// step is recomputed larger so the same elapsed time is consumed in fewer,
/// coarser steps.
pub fn plan_fixed_steps(elapsed_us: u64, step_us: u64, budget: u32) -> FixedStepPlan {
    assert!(step_us > 0, "fixed step must be positive");

    if budget == 0 || elapsed_us < step_us {
        return FixedStepPlan {
            iterations: 0,
            step_us,
        };
    }

    let wanted = elapsed_us / step_us;
    if wanted <= budget as u64 {
        return FixedStepPlan {
            iterations: wanted as u32,
            step_us,
        };
    }
    // Consume the same elapsed time in fewer, bigger steps.
    FixedStepPlan {
        iterations: budget,
        step_us: elapsed_us / budget as u64,
    }
}

// =============================================================================
// Pacing Configuration
// =============================================================================

/// Shared pacing configuration, reconfigurable through the property store
///
/// Registered as a property observer for the update-rate and fixed-rate
/// properties; the scheduler reads a snapshot at every tick.
pub struct PacingProperties {
    config: Mutex<UpdateConfig>,
}

impl PacingProperties {
    pub fn new(config: UpdateConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
        })
    }

    pub fn snapshot(&self) -> UpdateConfig {
        self.config.lock().unwrap().clone()
    }
}

impl PropertyObserver for PacingProperties {
    fn on_property_changed(&self, name: &str, value: &PropertyValue) {
        let Some(value) = value.as_int() else {
            return;
        };
        if value < 0 {
            warn!(property = name, value, "negative rate ignored");
            return;
        }
        let mut config = self.config.lock().unwrap();
        match name {
            PROPERTY_UPDATE_RATE_HZ_MAX => {
                config.update_rate_hz_max = value as u32;
                debug!(rate_hz = value, "update rate reconfigured");
            }
            PROPERTY_FIXED_RATE_HZ => {
                if value == 0 {
                    warn!(property = name, "fixed rate of zero ignored");
                    return;
                }
                config.fixed_rate_hz = value as u32;
                debug!(rate_hz = value, "fixed rate reconfigured");
            }
            _ => {}
        }
    }
}

// =============================================================================
// Frame Statistics
// =============================================================================

/// Rolling frame statistics over the delta ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    pub samples: usize,
}

struct DeltaHistory {
    samples: [u64; FRAME_DELTA_HISTORY_COUNT],
    next: usize,
    len: usize,
}

impl DeltaHistory {
    fn new() -> Self {
        Self {
            samples: [0; FRAME_DELTA_HISTORY_COUNT],
            next: 0,
            len: 0,
        }
    }

    fn record(&mut self, delta_us: u64) {
        self.samples[self.next] = delta_us;
        self.next = (self.next + 1) % FRAME_DELTA_HISTORY_COUNT;
        self.len = (self.len + 1).min(FRAME_DELTA_HISTORY_COUNT);
    }

    fn stats(&self) -> FrameStats {
        if self.len == 0 {
            return FrameStats {
                average: Duration::ZERO,
                min: Duration::ZERO,
                max: Duration::ZERO,
                samples: 0,
            };
        }
        let window = &self.samples[..self.len];
        let sum: u64 = window.iter().sum();
        let min = *window.iter().min().unwrap_or(&0);
        let max = *window.iter().max().unwrap_or(&0);
        FrameStats {
            average: Duration::from_micros(sum / self.len as u64),
            min: Duration::from_micros(min),
            max: Duration::from_micros(max),
            samples: self.len,
        }
    }
}

// =============================================================================
// UpdateScheduler
// =============================================================================

/// The per-tick driver
pub struct UpdateScheduler {
    clock: Arc<dyn Clock>,
    pacing: Arc<PacingProperties>,
    frame_count: u64,
    last_update_us: Option<u64>,
    /// Virtual time already consumed by fixed updates
    fixed_time_us: Option<u64>,
    fixed_budget: u32,
    history: DeltaHistory,
}

impl UpdateScheduler {
    pub fn new(clock: Arc<dyn Clock>, config: UpdateConfig) -> Self {
        Self {
            clock,
            pacing: PacingProperties::new(config),
            frame_count: 0,
            last_update_us: None,
            fixed_time_us: None,
            fixed_budget: 0,
            history: DeltaHistory::new(),
        }
    }

    /// The shared pacing cell, for property-store subscription
    pub fn pacing(&self) -> &Arc<PacingProperties> {
        &self.pacing
    }

    /// Run one full tick against the coordinator's active set
    pub fn tick(&mut self, coordinator: &ActivationCoordinator) {
        let config = self.pacing.snapshot();
        let now_us = self.pace(&config);

        let delta_us = match self.last_update_us {
            Some(last) => now_us.saturating_sub(last),
            None => 0,
        };
        self.last_update_us = Some(now_us);
        if self.frame_count > 0 {
            self.history.record(delta_us);
        }
        self.frame_count += 1;
        trace!(frame = self.frame_count, delta_us, "tick");

        coordinator.apply_pending();
        let active = coordinator.snapshot_active();
        let dt = Duration::from_micros(delta_us);

        for manager in &active {
            manager.pre_update(dt);
        }
        self.run_fixed_steps(&config, &active, now_us);
        for manager in &active {
            manager.update(dt);
        }
        for manager in &active {
            manager.post_update(dt);
        }
    }

    /// Wait until the next scheduled update time, if a rate cap is set
    ///
    /// Sleeps in 1 ms chunks while at least `PACING_SPIN_THRESHOLD_US`
    /// remain, then busy-polls for the final stretch.
    fn pace(&mut self, config: &UpdateConfig) -> u64 {
        if config.update_rate_hz_max == 0 {
            return self.clock.now_us();
        }
        let period_us = 1_000_000 / config.update_rate_hz_max as u64;
        let target_us = match self.last_update_us {
            Some(last) => last + period_us,
            None => return self.clock.now_us(),
        };

        loop {
            let now_us = self.clock.now_us();
            if now_us >= target_us {
                return now_us;
            }
            let remaining_us = target_us - now_us;
            if remaining_us >= PACING_SPIN_THRESHOLD_US {
                self.clock.sleep_ms(1);
            } else {
                self.clock.spin_until_us(target_us);
                return self.clock.now_us();
            }
        }
    }

    /// Run the bounded fixed-step catch-up loop
    fn run_fixed_steps(
        &mut self,
        config: &UpdateConfig,
        active: &[selkie_core::manager::SharedManager],
        now_us: u64,
    ) {
        self.fixed_budget = (self.fixed_budget + config.fixed_steps_replenish_per_tick)
            .min(config.fixed_steps_budget_max);

        let fixed_time_us = *self.fixed_time_us.get_or_insert(now_us);
        let step_us = 1_000_000 / config.fixed_rate_hz as u64;
        let elapsed_us = now_us.saturating_sub(fixed_time_us);

        let plan = plan_fixed_steps(elapsed_us, step_us, self.fixed_budget);
        if plan.iterations == 0 {
            return;
        }
        assert!(
            plan.iterations <= self.fixed_budget,
            "fixed-step plan exceeds remaining budget"
        );
        trace!(
            iterations = plan.iterations,
            step_us = plan.step_us,
            elapsed_us,
            "fixed-step catch-up"
        );

        let dt = Duration::from_micros(plan.step_us);
        for _ in 0..plan.iterations {
            for manager in active {
                manager.fixed_update(dt);
            }
        }
        self.fixed_budget -= plan.iterations;
        self.fixed_time_us = Some(fixed_time_us + plan.iterations as u64 * plan.step_us);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Remaining fixed-step budget after the last tick
    pub fn remaining_fixed_budget(&self) -> u32 {
        self.fixed_budget
    }

    /// Rolling average/min/max over recent frame deltas
    pub fn frame_stats(&self) -> FrameStats {
        self.history.stats()
    }
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("frame_count", &self.frame_count)
            .field("fixed_budget", &self.fixed_budget)
            .finish()
    }
}
