//! Selkie Runtime
//!
//! Activation coordinator, update scheduler, and root runtime.
//!
//! # Overview
//!
//! The runtime layer owns what changes at tick boundaries:
//! - [`ActivationCoordinator`]: the global active-singleton table (one slot
//!   per manager type) and its staged change queue, applied once per tick
//!   in remove/add/change order with the handoff protocol between an
//!   outgoing occupant and its replacement.
//! - [`UpdateScheduler`]: pacing to a configurable maximum update rate, the
//!   bounded fixed-step catch-up loop, and the four-phase dispatch.
//! - [`Runtime`]: the root value owning registries, coordinator, scheduler,
//!   and property store, orchestrating the operations that cross them.
//!
//! # TigerStyle
//! - Single activation guarantee (at most one live occupant per type)
//! - Staging is thread-safe and cheap; application is main-thread, bounded
//! - No lock held across a manager hook

pub mod coordinator;
pub mod runtime;
pub mod scheduler;

pub use coordinator::ActivationCoordinator;
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::{plan_fixed_steps, FixedStepPlan, FrameStats, PacingProperties, UpdateScheduler};
