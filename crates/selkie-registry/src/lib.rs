//! Selkie Registry
//!
//! Library and manager registries for the Selkie runtime.
//!
//! # Overview
//!
//! The registry layer owns identity and init lifecycle:
//! - [`LibraryRegistry`] owns the set of loaded libraries, keyed by id and
//!   by name, and drives each through its init sequence on registration.
//! - [`Library`] owns one loaded unit: its OS handle, its root module
//!   object, its log relay, and the per-library manager registry (keyed by
//!   id and by name within the library's namespace).
//!
//! Activation is not decided here: the activation coordinator in
//! `selkie-runtime` owns the global active-singleton table, and the root
//! runtime orchestrates eviction before anything is unregistered.
//!
//! # TigerStyle
//!
//! - Dual-keyed dense tables; removal tombstones, never compacts
//! - Identity conflicts are typed errors, tables left unchanged
//! - Out-of-order lifecycle calls assert

pub mod library;
pub mod registry;

pub use library::Library;
pub use registry::LibraryRegistry;
