//! Selkie Core
//!
//! Core types, errors, and lifecycle machinery for the Selkie manager
//! runtime.
//!
//! # Overview
//!
//! Selkie is a component/manager lifecycle runtime: dynamically loaded
//! libraries each register a set of pluggable managers, and across all
//! loaded libraries exactly one implementation of each manager *type* is
//! the active singleton at any moment, swappable without restarting the
//! process.
//!
//! This crate holds the pieces everything else builds on: identity types,
//! the error taxonomy, the shared four-state lifecycle machine, the
//! `Manager` and `LibraryModule` traits, lifecycle signals, the per-library
//! log bootstrap, the property store, and the clock/loader I/O seams.
//!
//! # TigerStyle
//!
//! - Explicit limits with big-endian naming (e.g. `LOG_RELAY_BUFFER_COUNT_MAX`)
//! - Recoverable failures are typed errors; protocol violations assert
//! - All external I/O behind abstraction traits

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod io;
pub mod library;
pub mod lifecycle;
pub mod log;
pub mod manager;
pub mod properties;
pub mod telemetry;

pub use config::{RuntimeConfig, UpdateConfig, PROPERTY_FIXED_RATE_HZ, PROPERTY_UPDATE_RATE_HZ_MAX};
pub use constants::*;
pub use error::{Error, Result};
pub use event::{LifecycleObserver, Signal};
pub use io::{Clock, LibraryLoader, LoadedLibrary, WallClock};
pub use library::{LibraryEntryFn, LibraryId, LibraryInfo, LibraryModule, LIBRARY_ENTRY_SYMBOL};
pub use lifecycle::LifecycleState;
pub use log::{LogLevel, LogRecord, LogRelay, LogSink, LOG_MANAGER_ID, LOG_MANAGER_NAME};
pub use manager::{Manager, ManagerDescriptor, ManagerHandle, ManagerId, SharedManager};
pub use properties::{PropertyObserver, PropertyStore, PropertyValue};
pub use telemetry::{init_telemetry, TelemetryConfig};
