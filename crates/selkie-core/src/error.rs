//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.
//!
//! Recoverable failures (identity conflicts, missed lookups, bad input) are
//! returned as `Error` values and never panic. Lifecycle protocol violations
//! are not represented here: calling a transition from the wrong state means
//! an invariant is already broken, and asserts immediately instead.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Library Errors
    // =========================================================================
    #[error("Library load failed: {path}, reason: {reason}")]
    LibraryLoadFailed { path: String, reason: String },

    #[error("Library entry point missing: {path}, symbol: {symbol}")]
    EntryPointMissing { path: String, symbol: String },

    #[error("Library entry point returned null: {path}")]
    EntryPointNull { path: String },

    #[error("Library id conflict: {id} already registered as \"{existing_name}\"")]
    LibraryIdConflict { id: String, existing_name: String },

    #[error("Library name conflict: \"{name}\" already registered")]
    LibraryNameConflict { name: String },

    #[error("Library not found: {key}")]
    LibraryNotFound { key: String },

    // =========================================================================
    // Manager Errors
    // =========================================================================
    #[error("Manager id conflict in library \"{library}\": {id} (\"{name}\")")]
    ManagerIdConflict {
        library: String,
        id: String,
        name: String,
    },

    #[error("Manager name conflict in library \"{library}\": \"{name}\"")]
    ManagerNameConflict { library: String, name: String },

    #[error("Manager \"{name}\" has no owning library")]
    ManagerUnowned { name: String },

    #[error("Manager \"{name}\" is owned by \"{owner}\", not \"{library}\"")]
    ManagerForeignOwner {
        name: String,
        owner: String,
        library: String,
    },

    #[error("Manager not found: {key}")]
    ManagerNotFound { key: String },

    #[error("Manager not active: {key}")]
    ManagerNotActive { key: String },

    #[error("Manager activation failed: \"{name}\", reason: {reason}")]
    ManagerActivationFailed { name: String, reason: String },

    #[error("Manager init failed: \"{name}\", reason: {reason}")]
    ManagerInitFailed { name: String, reason: String },

    // =========================================================================
    // Property Errors
    // =========================================================================
    #[error("Property not found: \"{name}\"")]
    PropertyNotFound { name: String },

    #[error("Property already registered: \"{name}\"")]
    PropertyAlreadyRegistered { name: String },

    #[error("Property \"{name}\" is constant and cannot be modified")]
    PropertyConstant { name: String },

    #[error("Property type mismatch: \"{name}\" holds {actual}, requested {expected}")]
    PropertyTypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Configuration parse failed: {reason}")]
    ConfigurationParseFailed { reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {message}")]
    Internal { message: String },
}
