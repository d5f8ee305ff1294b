//! Simulated library loading
//!
//! TigerStyle: Deterministic stand-ins behind the production trait.
//!
//! `SimLoader` plays the role the OS dynamic-library primitive plays in
//! production: paths are keyed to in-process module factories, and load or
//! entry-point failures are configured explicitly so registration error
//! paths can be exercised without building shared objects.

use selkie_core::error::{Error, Result};
use selkie_core::io::{LibraryLoader, LoadedLibrary};
use selkie_core::library::{LibraryId, LibraryModule, LIBRARY_ENTRY_SYMBOL};
use selkie_core::manager::SharedManager;
use selkie_core::properties::{PropertyStore, PropertyValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type ModuleFactory = Arc<dyn Fn() -> Box<dyn LibraryModule> + Send + Sync>;

#[derive(Clone)]
enum SimTarget {
    Module(ModuleFactory),
    /// The library opens but exposes no entry-point symbol
    MissingEntry,
    /// The entry point resolves but returns a null root object
    NullEntry,
}

/// Path-keyed in-process library loader
pub struct SimLoader {
    targets: Mutex<HashMap<PathBuf, SimTarget>>,
}

impl SimLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            targets: Mutex::new(HashMap::new()),
        })
    }

    /// Provide a module factory for a path
    pub fn provide(
        &self,
        path: impl Into<PathBuf>,
        factory: impl Fn() -> Box<dyn LibraryModule> + Send + Sync + 'static,
    ) {
        self.targets
            .lock()
            .unwrap()
            .insert(path.into(), SimTarget::Module(Arc::new(factory)));
    }

    /// Make a path load successfully but miss the entry-point symbol
    pub fn provide_missing_entry(&self, path: impl Into<PathBuf>) {
        self.targets
            .lock()
            .unwrap()
            .insert(path.into(), SimTarget::MissingEntry);
    }

    /// Make a path's entry point return a null root object
    pub fn provide_null_entry(&self, path: impl Into<PathBuf>) {
        self.targets
            .lock()
            .unwrap()
            .insert(path.into(), SimTarget::NullEntry);
    }

    /// Forget a path (subsequent opens fail to load)
    pub fn remove(&self, path: &Path) {
        self.targets.lock().unwrap().remove(path);
    }
}

impl LibraryLoader for SimLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        let target = self.targets.lock().unwrap().get(path).cloned();
        match target {
            Some(target) => Ok(Box::new(SimLibrary {
                path: path.to_path_buf(),
                target,
            })),
            None => Err(Error::LibraryLoadFailed {
                path: path.display().to_string(),
                reason: "no simulated library at this path".into(),
            }),
        }
    }
}

struct SimLibrary {
    path: PathBuf,
    target: SimTarget,
}

impl LoadedLibrary for SimLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_point(&self) -> Result<Box<dyn LibraryModule>> {
        match &self.target {
            SimTarget::Module(factory) => Ok(factory()),
            SimTarget::MissingEntry => Err(Error::EntryPointMissing {
                path: self.path.display().to_string(),
                symbol: LIBRARY_ENTRY_SYMBOL.into(),
            }),
            SimTarget::NullEntry => Err(Error::EntryPointNull {
                path: self.path.display().to_string(),
            }),
        }
    }
}

// =============================================================================
// SimModule
// =============================================================================

/// Configurable library module for tests
///
/// Builds a module with a fixed identity, a set of managers handed over on
/// `create_managers`, optional registered properties, and an optional
/// failing setup hook.
pub struct SimModule {
    id: LibraryId,
    name: String,
    managers: Vec<SharedManager>,
    properties: Vec<(String, PropertyValue, bool)>,
    fail_setup: Option<String>,
}

impl SimModule {
    pub fn new(id: LibraryId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            managers: Vec::new(),
            properties: Vec::new(),
            fail_setup: None,
        }
    }

    /// Add a manager to hand over during init, in registration order
    pub fn with_manager(mut self, manager: SharedManager) -> Self {
        self.managers.push(manager);
        self
    }

    /// Register a property during init
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: PropertyValue,
        constant: bool,
    ) -> Self {
        self.properties.push((name.into(), value, constant));
        self
    }

    /// Make the setup hook fail with the given reason
    pub fn with_failing_setup(mut self, reason: impl Into<String>) -> Self {
        self.fail_setup = Some(reason.into());
        self
    }
}

impl LibraryModule for SimModule {
    fn id(&self) -> LibraryId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self) -> Result<()> {
        match &self.fail_setup {
            Some(reason) => Err(Error::Internal {
                message: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn create_managers(&mut self) -> Vec<SharedManager> {
        std::mem::take(&mut self.managers)
    }

    fn register_properties(&mut self, properties: &mut PropertyStore) -> Result<()> {
        for (name, value, constant) in &self.properties {
            properties.register(name.clone(), value.clone(), *constant)?;
        }
        Ok(())
    }

    fn unregister_properties(&mut self, properties: &mut PropertyStore) {
        for (name, _, _) in &self.properties {
            let _ = properties.unregister(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_unknown_path_fails_to_load() {
        let loader = SimLoader::new();
        let err = match loader.open(Path::new("nope.so")) {
            Ok(_) => panic!("expected open to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::LibraryLoadFailed { .. }));
    }

    #[test]
    fn test_module_round_trip() {
        let loader = SimLoader::new();
        let id = Uuid::new_v4();
        loader.provide("core.so", move || Box::new(SimModule::new(id, "Core")));

        let handle = loader.open(Path::new("core.so")).unwrap();
        let module = handle.entry_point().unwrap();
        assert_eq!(module.id(), id);
        assert_eq!(module.name(), "Core");
    }

    #[test]
    fn test_entry_point_failures() {
        let loader = SimLoader::new();
        loader.provide_missing_entry("broken.so");
        loader.provide_null_entry("null.so");

        let err = match loader.open(Path::new("broken.so")).unwrap().entry_point() {
            Ok(_) => panic!("expected entry_point to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::EntryPointMissing { .. }));

        let err = match loader.open(Path::new("null.so")).unwrap().entry_point() {
            Ok(_) => panic!("expected entry_point to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::EntryPointNull { .. }));
    }
}
