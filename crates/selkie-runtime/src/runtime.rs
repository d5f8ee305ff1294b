//! Root runtime
//!
//! TigerStyle: Single entry point, explicit configuration, clean teardown.
//!
//! The `Runtime` is the one root value owning the property store, the
//! library registry, the activation coordinator, and the update scheduler.
//! Nothing here is ambient global state: everything reaches the registries
//! through this value. It also does the orchestration that crosses
//! component boundaries: evicting a library's managers from the active
//! table before the registry tears the library down, and wiring each
//! library's log relay to the activation notification.

use crate::coordinator::ActivationCoordinator;
use crate::scheduler::{FrameStats, UpdateScheduler};
use selkie_core::config::{RuntimeConfig, PROPERTY_FIXED_RATE_HZ, PROPERTY_UPDATE_RATE_HZ_MAX};
use selkie_core::error::{Error, Result};
use selkie_core::event::LifecycleObserver;
use selkie_core::io::{Clock, LibraryLoader, WallClock};
use selkie_core::library::LibraryId;
use selkie_core::log::LOG_MANAGER_ID;
use selkie_core::manager::{ManagerId, SharedManager};
use selkie_core::properties::{PropertyObserver, PropertyStore, PropertyValue};
use selkie_registry::{Library, LibraryRegistry};
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::info;

/// Builder for creating a runtime
pub struct RuntimeBuilder {
    loader: Option<Arc<dyn LibraryLoader>>,
    clock: Option<Arc<dyn Clock>>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: None,
            clock: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the library loader (required)
    pub fn with_loader(mut self, loader: Arc<dyn LibraryLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the clock; defaults to the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime
    ///
    /// # Errors
    /// Returns error when no loader is configured or the configuration is
    /// invalid.
    pub fn build(self) -> Result<Runtime> {
        self.config.validate()?;
        let loader = self.loader.ok_or_else(|| Error::InvalidConfiguration {
            field: "loader".into(),
            reason: "a library loader is required".into(),
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(WallClock::new()));

        let mut properties = PropertyStore::new();
        properties.register(
            PROPERTY_UPDATE_RATE_HZ_MAX,
            PropertyValue::Int(self.config.update.update_rate_hz_max as i64),
            false,
        )?;
        properties.register(
            PROPERTY_FIXED_RATE_HZ,
            PropertyValue::Int(self.config.update.fixed_rate_hz as i64),
            false,
        )?;

        let scheduler = UpdateScheduler::new(clock.clone(), self.config.update.clone());
        properties.subscribe(
            Arc::downgrade(scheduler.pacing()) as Weak<dyn PropertyObserver>
        );

        info!(
            update_rate_hz_max = self.config.update.update_rate_hz_max,
            fixed_rate_hz = self.config.update.fixed_rate_hz,
            "runtime ready"
        );
        Ok(Runtime {
            registry: LibraryRegistry::new(loader, clock.clone()),
            coordinator: Arc::new(ActivationCoordinator::new()),
            scheduler,
            properties,
            clock,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The root runtime value
pub struct Runtime {
    properties: PropertyStore,
    registry: LibraryRegistry,
    coordinator: Arc<ActivationCoordinator>,
    scheduler: UpdateScheduler,
    clock: Arc<dyn Clock>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    // =========================================================================
    // Libraries
    // =========================================================================

    /// Load, register, and initialize the library at `path`
    ///
    /// On success the library's log relay is subscribed to the activation
    /// notification, and bound immediately if a logging manager is already
    /// active.
    pub fn load_library(&mut self, path: &Path) -> Result<LibraryId> {
        let id = self.registry.register(path, &mut self.properties)?;

        let relay = self.registry.find_by_id(id)?.log().clone();
        self.coordinator
            .subscribe(Arc::downgrade(&relay) as Weak<dyn LifecycleObserver>);
        if let Ok(log_manager) = self.coordinator.active_by_id(LOG_MANAGER_ID) {
            relay.on_lifecycle_changed(&log_manager, true);
        }
        Ok(id)
    }

    /// Deactivate, deinitialize, and remove a library
    ///
    /// Every manager the library owns is evicted from the active table
    /// first, in registration order, then the registry tears the library
    /// down and tombstones its slot.
    pub fn unload_library(&mut self, id: LibraryId) -> Result<()> {
        let managers: Vec<SharedManager> = self
            .registry
            .find_by_id(id)?
            .managers()
            .cloned()
            .collect();
        for manager in &managers {
            self.coordinator.evict(manager);
        }
        self.registry.unregister(id, &mut self.properties)
    }

    pub fn library(&self, id: LibraryId) -> Result<&Library> {
        self.registry.find_by_id(id)
    }

    pub fn library_by_name(&self, name: &str) -> Result<&Library> {
        self.registry.find_by_name(name)
    }

    pub fn library_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Managers
    // =========================================================================

    /// Bind a manager to a loaded library and register it
    pub fn register_manager(&mut self, library: LibraryId, manager: SharedManager) -> Result<()> {
        self.registry
            .find_by_id_mut(library)?
            .adopt_manager(manager)
    }

    /// Evict, deinitialize, and unregister a manager
    pub fn unregister_manager(
        &mut self,
        library: LibraryId,
        manager: &SharedManager,
    ) -> Result<()> {
        self.coordinator.evict(manager);
        self.registry
            .find_by_id_mut(library)?
            .unregister_manager(manager)
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Stage a manager for activation at the next tick
    pub fn request_activate(&self, manager: SharedManager) -> Result<()> {
        self.coordinator.request_activate(manager)
    }

    /// Stage the active occupant of a type for deactivation
    pub fn request_deactivate(&self, id: ManagerId) -> Result<()> {
        self.coordinator.request_deactivate(id)
    }

    pub fn request_deactivate_by_name(&self, name: &str) -> Result<()> {
        self.coordinator.request_deactivate_by_name(name)
    }

    /// The live occupant for a manager type
    pub fn active(&self, id: ManagerId) -> Result<SharedManager> {
        self.coordinator.active_by_id(id)
    }

    pub fn active_by_name(&self, name: &str) -> Result<SharedManager> {
        self.coordinator.active_by_name(name)
    }

    pub fn coordinator(&self) -> &Arc<ActivationCoordinator> {
        &self.coordinator
    }

    // =========================================================================
    // Update Loop
    // =========================================================================

    /// Run one full tick
    pub fn tick(&mut self) {
        self.scheduler.tick(&self.coordinator);
    }

    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_count()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.scheduler.frame_stats()
    }

    pub fn scheduler(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("libraries", &self.registry.len())
            .field("active", &self.coordinator.active_count())
            .field("frame_count", &self.scheduler.frame_count())
            .finish()
    }
}
