//! Library abstractions
//!
//! TigerStyle: Explicit identity, validated on construction.
//!
//! A library is a dynamically loaded unit owning one or more managers. Its
//! id and name are constant per library type. `LibraryInfo` is the shared
//! identity record: the registry's `Library` holds the owning `Arc`, every
//! manager the library registers holds a `Weak` back-reference to it, and
//! the `Weak` expiring marks the library as torn down.

use crate::constants::LIBRARY_NAME_LENGTH_BYTES_MAX;
use crate::error::{Error, Result};
use crate::manager::SharedManager;
use crate::properties::PropertyStore;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a library *type* (128-bit, constant per type)
pub type LibraryId = Uuid;

/// Well-known exported entry-point symbol resolved in every loaded library
pub const LIBRARY_ENTRY_SYMBOL: &str = "selkie_library_entry";

/// Signature of the exported entry point
///
/// Returns the library's root module object, or null on failure. The
/// returned pointer is `Box::into_raw` of a `Box<dyn LibraryModule>`; the
/// host takes ownership back with `Box::from_raw`.
pub type LibraryEntryFn = unsafe extern "C" fn() -> *mut dyn LibraryModule;

// =============================================================================
// LibraryInfo
// =============================================================================

/// Shared identity of a loaded library
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct LibraryInfo {
    id: LibraryId,
    name: String,
}

impl LibraryInfo {
    /// Create library identity with validation
    ///
    /// # Errors
    /// Returns error if the name is empty or exceeds the length limit.
    pub fn new(id: LibraryId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Internal {
                message: "library name must not be empty".into(),
            });
        }
        if name.len() > LIBRARY_NAME_LENGTH_BYTES_MAX {
            return Err(Error::Internal {
                message: format!(
                    "library name length {} exceeds limit {}",
                    name.len(),
                    LIBRARY_NAME_LENGTH_BYTES_MAX
                ),
            });
        }
        Ok(Self { id, name })
    }

    pub fn id(&self) -> LibraryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for LibraryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// =============================================================================
// LibraryModule Trait
// =============================================================================

/// The root object a loaded library's entry point returns
///
/// Hooks are invoked by the library init/deinit sequences in a fixed order:
/// `setup`, manager construction and registration, property registration,
/// type-metadata registration on the way up; the exact reverse on the way
/// down. The type-metadata hooks are the seam for an external reflection
/// framework and default to no-ops.
pub trait LibraryModule: Send {
    /// The library type id (constant per library type)
    fn id(&self) -> LibraryId;

    /// The library type name (constant per library type)
    fn name(&self) -> &str;

    /// Library's own setup hook, first step of init
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Construct the managers this library owns, in registration order
    fn create_managers(&mut self) -> Vec<SharedManager> {
        Vec::new()
    }

    /// Register configuration properties
    fn register_properties(&mut self, _properties: &mut PropertyStore) -> Result<()> {
        Ok(())
    }

    /// Register reflection type metadata (external framework seam)
    fn register_types(&mut self) {}

    /// Unregister reflection type metadata
    fn unregister_types(&mut self) {}

    /// Unregister configuration properties
    fn unregister_properties(&mut self, _properties: &mut PropertyStore) {}

    /// Library's own teardown hook, last step of deinit
    fn teardown(&mut self) {}
}

/// Export the entry point for a library compiled as a cdylib
///
/// ```ignore
/// use selkie_core::declare_library;
///
/// struct CoreModule;
/// // ... impl LibraryModule for CoreModule ...
///
/// declare_library!(CoreModule::default());
/// ```
#[macro_export]
macro_rules! declare_library {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn selkie_library_entry() -> *mut dyn $crate::library::LibraryModule {
            let module: Box<dyn $crate::library::LibraryModule> = Box::new($ctor);
            Box::into_raw(module)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_info_validation() {
        let id = Uuid::new_v4();
        let info = LibraryInfo::new(id, "Core").unwrap();
        assert_eq!(info.id(), id);
        assert_eq!(info.name(), "Core");

        assert!(LibraryInfo::new(id, "").is_err());
        assert!(LibraryInfo::new(id, "x".repeat(LIBRARY_NAME_LENGTH_BYTES_MAX + 1)).is_err());
    }

    #[test]
    fn test_library_info_display() {
        let id = Uuid::nil();
        let info = LibraryInfo::new(id, "Core").unwrap();
        assert_eq!(info.to_string(), format!("Core ({})", id));
    }
}
