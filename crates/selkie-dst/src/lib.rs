//! Selkie DST - Deterministic Simulation Testing
//!
//! Deterministic stand-ins for every I/O seam the runtime depends on, so
//! the same lifecycle and scheduling code that runs in production runs in
//! tests with fully controlled time and loading.
//!
//! # Overview
//!
//! - [`SimClock`]: virtual time; `sleep_ms` advances, `spin_until_us`
//!   jumps to the deadline
//! - [`SimLoader`] / [`SimModule`]: path-keyed in-process library
//!   factories with configurable load and entry-point failures
//! - [`RecordingManager`] / [`RecordingLog`]: managers that journal every
//!   hook invocation for exact-ordering assertions
//!
//! # TigerStyle
//!
//! - All operations are deterministic
//! - Fault cases are explicit configuration, not chance

pub mod clock;
pub mod loader;
pub mod managers;

pub use clock::SimClock;
pub use loader::{SimLoader, SimModule};
pub use managers::{journal, journal_entries, HookEvent, Journal, RecordingLog, RecordingManager};
