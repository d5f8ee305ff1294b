//! Selkie Loader
//!
//! Native dynamic-library loading behind the core loader seam.
//!
//! # Overview
//!
//! `NativeLoader` opens shared objects with `libloading`, resolves the
//! well-known `selkie_library_entry` symbol, and takes ownership of the
//! root module object the entry point returns. The OS handle stays open
//! for as long as the [`LoadedLibrary`] value lives, since the module's
//! code lives inside it; dropping the value closes the library.
//!
//! Libraries export the entry point with `selkie_core::declare_library!`:
//!
//! ```ignore
//! declare_library!(CoreModule::default());
//! ```

use libloading::{Library, Symbol};
use selkie_core::error::{Error, Result};
use selkie_core::io::{LibraryLoader, LoadedLibrary};
use selkie_core::library::{LibraryEntryFn, LibraryModule, LIBRARY_ENTRY_SYMBOL};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loader over the OS dynamic-library primitive
#[derive(Debug, Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        // SAFETY: loading a library runs its initializers; the path is
        // caller-provided and trusted, as with any plugin host.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::LibraryLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "native library opened");
        Ok(Box::new(NativeLibrary {
            library,
            path: path.to_path_buf(),
        }))
    }
}

/// An open native library
pub struct NativeLibrary {
    library: Library,
    path: PathBuf,
}

impl LoadedLibrary for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_point(&self) -> Result<Box<dyn LibraryModule>> {
        // SAFETY: the symbol is declared with the signature
        // `declare_library!` exports; a library exporting the well-known
        // name with a different signature is undefined behavior, as with
        // any C plugin ABI.
        let entry: Symbol<'_, LibraryEntryFn> =
            unsafe { self.library.get(LIBRARY_ENTRY_SYMBOL.as_bytes()) }.map_err(|_| {
                Error::EntryPointMissing {
                    path: self.path.display().to_string(),
                    symbol: LIBRARY_ENTRY_SYMBOL.into(),
                }
            })?;

        // SAFETY: the entry point hands over ownership of a
        // `Box<dyn LibraryModule>` as a raw pointer (Box::into_raw).
        let raw = unsafe { entry() };
        if raw.is_null() {
            return Err(Error::EntryPointNull {
                path: self.path.display().to_string(),
            });
        }
        // SAFETY: non-null pointer produced by Box::into_raw in the
        // library's entry point; ownership transfers here exactly once.
        Ok(unsafe { Box::from_raw(raw) })
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_fails_to_load() {
        let loader = NativeLoader::new();
        let err = match loader.open(Path::new("/nonexistent/selkie-missing.so")) {
            Ok(_) => panic!("expected open to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::LibraryLoadFailed { .. }));
    }
}
