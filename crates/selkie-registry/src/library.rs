//! A loaded library and its manager registry
//!
//! TigerStyle: Single owner per table, tombstoning removal, asserted
//! lifecycle.
//!
//! A `Library` owns the OS handle it was loaded from, the root module
//! object its entry point returned, its log relay, and the managers it
//! registered. Managers are indexed by id and by name within the library's
//! namespace; no two managers in one library may share either key. Removal
//! nulls the slot and keeps the index mappings, so indices held elsewhere
//! stay valid until the next structural mutation.

use selkie_core::error::{Error, Result};
use selkie_core::io::{Clock, LoadedLibrary};
use selkie_core::library::{LibraryId, LibraryInfo, LibraryModule};
use selkie_core::lifecycle::LifecycleState;
use selkie_core::log::LogRelay;
use selkie_core::manager::{ManagerId, SharedManager};
use selkie_core::properties::PropertyStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One loaded library
pub struct Library {
    info: Arc<LibraryInfo>,
    /// Keeps the OS library open for as long as the module's code may run
    #[allow(dead_code)]
    os_handle: Box<dyn LoadedLibrary>,
    module: Box<dyn LibraryModule>,
    managers: Vec<Option<SharedManager>>,
    managers_by_id: HashMap<ManagerId, usize>,
    managers_by_name: HashMap<String, usize>,
    init_state: LifecycleState,
    log: Arc<LogRelay>,
}

impl Library {
    /// Wrap a freshly loaded module; the library starts Stopped
    pub fn new(
        os_handle: Box<dyn LoadedLibrary>,
        module: Box<dyn LibraryModule>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let info = Arc::new(LibraryInfo::new(module.id(), module.name())?);
        let log = LogRelay::new(info.name(), clock);
        Ok(Self {
            info,
            os_handle,
            module,
            managers: Vec::new(),
            managers_by_id: HashMap::new(),
            managers_by_name: HashMap::new(),
            init_state: LifecycleState::Stopped,
            log,
        })
    }

    pub fn info(&self) -> &Arc<LibraryInfo> {
        &self.info
    }

    pub fn id(&self) -> LibraryId {
        self.info.id()
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// The library's log bootstrap relay
    pub fn log(&self) -> &Arc<LogRelay> {
        &self.log
    }

    pub fn init_state(&self) -> LifecycleState {
        self.init_state
    }

    pub fn is_initialized(&self) -> bool {
        self.init_state.is_started()
    }

    // =========================================================================
    // Init Sequence
    // =========================================================================

    /// Drive the library through its init sequence
    ///
    /// Order: module setup, construct and register owned managers, register
    /// configuration properties, register type metadata. A failure at any
    /// step unwinds the managers registered so far and leaves the library
    /// Stopped.
    ///
    /// # Panics
    /// Initializing a library that is not Stopped asserts.
    pub fn initialize(&mut self, properties: &mut PropertyStore) -> Result<()> {
        self.init_state.transition_to(LifecycleState::Starting);
        debug!(library = %self.info, "initializing library");

        if let Err(e) = self.try_initialize(properties) {
            self.unwind_managers();
            self.init_state.transition_to(LifecycleState::Stopped);
            return Err(e);
        }

        self.init_state.transition_to(LifecycleState::Started);
        info!(
            library = %self.info,
            managers = self.manager_count(),
            "library initialized"
        );
        Ok(())
    }

    fn try_initialize(&mut self, properties: &mut PropertyStore) -> Result<()> {
        self.module.setup()?;
        for manager in self.module.create_managers() {
            manager.bind_owner(&self.info);
            self.register_manager(manager)?;
        }
        self.module.register_properties(properties)?;
        self.module.register_types();
        Ok(())
    }

    /// Drive the library through its deinit sequence
    ///
    /// Exact reverse of init: type metadata, properties, managers, module
    /// teardown. Every owned manager must already be deactivated; a still-
    /// active manager asserts inside its deinit.
    ///
    /// # Panics
    /// Deinitializing a library that is not Started asserts.
    pub fn deinitialize(&mut self, properties: &mut PropertyStore) {
        self.init_state.transition_to(LifecycleState::Stopping);
        debug!(library = %self.info, "deinitializing library");

        self.module.unregister_types();
        self.module.unregister_properties(properties);
        self.unwind_managers();
        self.module.teardown();

        self.init_state.transition_to(LifecycleState::Stopped);
        info!(library = %self.info, "library deinitialized");
    }

    /// Deinitialize and drop every registered manager, in registration order
    fn unwind_managers(&mut self) {
        for slot in self.managers.iter_mut() {
            if let Some(manager) = slot.take() {
                manager.deinitialize();
                manager.clear_owner();
            }
        }
        self.managers_by_id.clear();
        self.managers_by_name.clear();
        self.managers.clear();
    }

    // =========================================================================
    // Manager Registry
    // =========================================================================

    /// Bind a manager to this library and register it
    pub fn adopt_manager(&mut self, manager: SharedManager) -> Result<()> {
        manager.bind_owner(&self.info);
        self.register_manager(manager)
    }

    /// Register a manager owned by this library
    ///
    /// Fails if the manager has no owning library, if the owner is a
    /// different library, or if its id or name collides within this
    /// library's namespace. On success the manager's init hook runs (if it
    /// has not already) and the manager is appended and indexed by both
    /// keys. A failed registration leaves the tables unchanged.
    pub fn register_manager(&mut self, manager: SharedManager) -> Result<()> {
        let owner = match manager.owner() {
            Some(owner) => owner,
            None => {
                return Err(Error::ManagerUnowned {
                    name: manager.name().to_string(),
                })
            }
        };
        if !Arc::ptr_eq(&owner, &self.info) {
            return Err(Error::ManagerForeignOwner {
                name: manager.name().to_string(),
                owner: owner.name().to_string(),
                library: self.info.name().to_string(),
            });
        }
        // Conflicts are decided by live occupancy: a tombstoned mapping
        // keeps its index and is refilled below.
        let id_index = self.managers_by_id.get(&manager.id()).copied();
        if id_index.is_some_and(|index| self.managers[index].is_some()) {
            return Err(Error::ManagerIdConflict {
                library: self.info.name().to_string(),
                id: manager.id().to_string(),
                name: manager.name().to_string(),
            });
        }
        let name_index = self.managers_by_name.get(manager.name()).copied();
        if name_index.is_some_and(|index| self.managers[index].is_some()) {
            return Err(Error::ManagerNameConflict {
                library: self.info.name().to_string(),
                name: manager.name().to_string(),
            });
        }
        if id_index != name_index {
            // Descriptors are constant per type, so the two maps can only
            // diverge when an invariant is already broken upstream.
            warn!(
                library = %self.info,
                manager = %manager.descriptor(),
                ?id_index,
                ?name_index,
                "manager index maps disagree, registration rejected"
            );
            return Err(Error::Internal {
                message: format!(
                    "inconsistent manager index maps for {}",
                    manager.descriptor()
                ),
            });
        }

        manager.initialize()?;

        let index = match id_index {
            Some(index) => index,
            None => {
                let index = self.managers.len();
                self.managers.push(None);
                self.managers_by_id.insert(manager.id(), index);
                self.managers_by_name
                    .insert(manager.name().to_string(), index);
                index
            }
        };
        debug!(
            library = %self.info,
            manager = %manager.descriptor(),
            index,
            "manager registered"
        );
        self.managers[index] = Some(manager);
        Ok(())
    }

    /// Unregister a manager, tombstoning its slot
    ///
    /// The manager must already be deactivated (the runtime evicts it from
    /// the active table first); it is deinitialized here and its slot nulled
    /// with the index mappings retained.
    pub fn unregister_manager(&mut self, manager: &SharedManager) -> Result<()> {
        let index = match self.managers_by_id.get(&manager.id()) {
            Some(index) => *index,
            None => {
                return Err(Error::ManagerNotFound {
                    key: manager.descriptor().to_string(),
                })
            }
        };
        let occupied = self
            .managers
            .get(index)
            .and_then(|slot| slot.as_ref())
            .is_some_and(|m| Arc::ptr_eq(m, manager));
        if !occupied {
            return Err(Error::ManagerNotFound {
                key: manager.descriptor().to_string(),
            });
        }

        manager.deinitialize();
        manager.clear_owner();
        self.managers[index] = None;
        debug!(
            library = %self.info,
            manager = %manager.descriptor(),
            index,
            "manager unregistered"
        );
        Ok(())
    }

    /// Find a live manager by type id
    pub fn find_manager_by_id(&self, id: ManagerId) -> Result<SharedManager> {
        let index = *self
            .managers_by_id
            .get(&id)
            .ok_or_else(|| Error::ManagerNotFound { key: id.to_string() })?;
        self.manager_at(index, &id.to_string())
    }

    /// Find a live manager by type name
    pub fn find_manager_by_name(&self, name: &str) -> Result<SharedManager> {
        let index = *self
            .managers_by_name
            .get(name)
            .ok_or_else(|| Error::ManagerNotFound { key: name.to_string() })?;
        self.manager_at(index, name)
    }

    fn manager_at(&self, index: usize, key: &str) -> Result<SharedManager> {
        let manager = self
            .managers
            .get(index)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::ManagerNotFound {
                key: key.to_string(),
            })?;

        // The id and name maps must agree on the position once either exists.
        let by_name = self.managers_by_name.get(manager.name()).copied();
        if by_name != Some(index) {
            warn!(
                library = %self.info,
                manager = %manager.descriptor(),
                id_index = index,
                name_index = ?by_name,
                "manager index maps disagree, trusting in-bounds id index"
            );
        }
        Ok(manager)
    }

    /// Live managers, in registration order
    pub fn managers(&self) -> impl Iterator<Item = &SharedManager> {
        self.managers.iter().filter_map(|slot| slot.as_ref())
    }

    /// Number of live managers
    pub fn manager_count(&self) -> usize {
        self.managers.iter().filter(|slot| slot.is_some()).count()
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("info", &self.info)
            .field("init_state", &self.init_state)
            .field("managers", &self.manager_count())
            .finish()
    }
}
