//! The library registry
//!
//! TigerStyle: Dual-keyed dense table, tombstoning removal, typed
//! conflicts.
//!
//! Owns the set of loaded libraries. Registration loads the target through
//! the configured loader, resolves the entry point, rejects identity
//! conflicts, then drives the library through its full init sequence before
//! returning it. Removal nulls the registry slot rather than compacting the
//! array, so positions held elsewhere stay valid.

use crate::library::Library;
use selkie_core::error::{Error, Result};
use selkie_core::io::{Clock, LibraryLoader};
use selkie_core::library::LibraryId;
use selkie_core::properties::PropertyStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry of loaded libraries, keyed by id and by name
pub struct LibraryRegistry {
    loader: Arc<dyn LibraryLoader>,
    clock: Arc<dyn Clock>,
    entries: Vec<Option<Library>>,
    by_id: HashMap<LibraryId, usize>,
    by_name: HashMap<String, usize>,
}

impl LibraryRegistry {
    pub fn new(loader: Arc<dyn LibraryLoader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            loader,
            clock,
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Load, validate, index, and initialize the library at `path`
    ///
    /// Rejection leaves every table unchanged and drops the OS handle:
    /// load failure, missing entry point, null root object, or an id/name
    /// collision with an already-registered library.
    pub fn register(&mut self, path: &Path, properties: &mut PropertyStore) -> Result<LibraryId> {
        let os_handle = self.loader.open(path)?;
        let module = os_handle.entry_point()?;

        if let Some(index) = self.by_id.get(&module.id()) {
            let existing_name = self.entries[*index]
                .as_ref()
                .map(|lib| lib.name().to_string())
                .unwrap_or_default();
            return Err(Error::LibraryIdConflict {
                id: module.id().to_string(),
                existing_name,
            });
        }
        if self.by_name.contains_key(module.name()) {
            return Err(Error::LibraryNameConflict {
                name: module.name().to_string(),
            });
        }

        let library = Library::new(os_handle, module, self.clock.clone())?;
        let id = library.id();
        let name = library.name().to_string();

        let index = self.entries.len();
        self.entries.push(Some(library));
        self.by_id.insert(id, index);
        self.by_name.insert(name.clone(), index);
        debug!(library = %name, index, "library indexed");

        // Drive init before returning; roll back on failure so a rejected
        // registration is observable nowhere.
        let outcome = self.entries[index]
            .as_mut()
            .map(|lib| lib.initialize(properties))
            .unwrap_or_else(|| {
                Err(Error::Internal {
                    message: "freshly indexed library slot is empty".into(),
                })
            });
        if let Err(e) = outcome {
            self.by_id.remove(&id);
            self.by_name.remove(&name);
            self.entries.pop();
            return Err(e);
        }

        info!(library = %name, %id, "library registered");
        Ok(id)
    }

    /// Tear down and remove a library
    ///
    /// Every manager the library owns must already be evicted from the
    /// active table. The registry slot is set to `None`; the position is
    /// not reused and the array is not compacted.
    pub fn unregister(&mut self, id: LibraryId, properties: &mut PropertyStore) -> Result<()> {
        let index = match self.by_id.get(&id) {
            Some(index) => *index,
            None => return Err(Error::LibraryNotFound { key: id.to_string() }),
        };
        let mut library = match self.entries.get_mut(index).and_then(Option::take) {
            Some(library) => library,
            None => return Err(Error::LibraryNotFound { key: id.to_string() }),
        };

        library.deinitialize(properties);
        self.by_id.remove(&id);
        self.by_name.remove(library.name());
        info!(library = %library.name(), %id, "library unregistered");
        // Dropping the library closes its OS handle.
        Ok(())
    }

    /// Find a live library by id
    pub fn find_by_id(&self, id: LibraryId) -> Result<&Library> {
        let index = *self
            .by_id
            .get(&id)
            .ok_or_else(|| Error::LibraryNotFound { key: id.to_string() })?;
        self.library_at(index, &id.to_string())
    }

    /// Find a live library by name
    pub fn find_by_name(&self, name: &str) -> Result<&Library> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| Error::LibraryNotFound {
                key: name.to_string(),
            })?;
        self.library_at(index, name)
    }

    pub fn find_by_id_mut(&mut self, id: LibraryId) -> Result<&mut Library> {
        let index = *self
            .by_id
            .get(&id)
            .ok_or_else(|| Error::LibraryNotFound { key: id.to_string() })?;
        self.entries
            .get_mut(index)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| Error::LibraryNotFound { key: id.to_string() })
    }

    fn library_at(&self, index: usize, key: &str) -> Result<&Library> {
        let library = self
            .entries
            .get(index)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| Error::LibraryNotFound {
                key: key.to_string(),
            })?;

        // The id and name maps must agree on the position once either exists.
        let by_name = self.by_name.get(library.name()).copied();
        if by_name != Some(index) {
            warn!(
                library = %library.name(),
                id_index = index,
                name_index = ?by_name,
                "library index maps disagree, trusting in-bounds id index"
            );
        }
        Ok(library)
    }

    /// Number of live libraries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live libraries, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Library> {
        self.entries.iter().filter_map(|slot| slot.as_ref())
    }
}

impl std::fmt::Debug for LibraryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryRegistry")
            .field("libraries", &self.len())
            .field("slots", &self.entries.len())
            .finish()
    }
}
