//! Manager abstractions
//!
//! TigerStyle: Explicit types, validated identity, asserted lifecycle.
//!
//! A manager is a pluggable component implementing a fixed capability type
//! (logging, threading, windowing, ...). The type is identified by a
//! descriptor whose id and name are constant across every implementation of
//! that type; at most one implementation per type is the active singleton at
//! any moment. `ManagerHandle` wraps the implementation together with its
//! two independent lifecycle machines (init, activation) and their signals.

use crate::constants::MANAGER_NAME_LENGTH_BYTES_MAX;
use crate::error::{Error, Result};
use crate::event::Signal;
use crate::library::LibraryInfo;
use crate::lifecycle::LifecycleState;
use crate::log::LogSink;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Unique identifier for a manager *type* (128-bit, constant per type)
pub type ManagerId = Uuid;

/// A manager shared between its owning library, the active table, and
/// caller-held references
pub type SharedManager = Arc<ManagerHandle>;

// =============================================================================
// ManagerDescriptor
// =============================================================================

/// Identity of a manager type
///
/// Both fields are constant per manager *type*: every implementation of the
/// same capability reports the same id and name.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ManagerDescriptor {
    id: ManagerId,
    name: String,
}

impl ManagerDescriptor {
    /// Create a descriptor with validation
    ///
    /// # Errors
    /// Returns error if the name is empty or exceeds the length limit.
    pub fn new(id: ManagerId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Internal {
                message: "manager name must not be empty".into(),
            });
        }
        if name.len() > MANAGER_NAME_LENGTH_BYTES_MAX {
            return Err(Error::Internal {
                message: format!(
                    "manager name length {} exceeds limit {}",
                    name.len(),
                    MANAGER_NAME_LENGTH_BYTES_MAX
                ),
            });
        }
        Ok(Self { id, name })
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ManagerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// =============================================================================
// Manager Trait
// =============================================================================

/// A pluggable manager implementation
///
/// The framework promises to invoke the four update phases in the fixed
/// order `pre_update`, `fixed_update` (zero or more times), `update`,
/// `post_update`, once per tick, for every currently-active manager.
///
/// # Hooks
/// - `on_init`/`on_deinit` run under the owning library's init sequence.
/// - `on_activate` receives the predecessor occupant of this manager's type
///   slot, if a live one is being replaced, so state can be migrated.
/// - `on_replaced` is the handoff point on the *outgoing* instance: it is
///   called with the incoming replacement before deactivation.
pub trait Manager: Send {
    /// The type descriptor (constant per manager type)
    fn descriptor(&self) -> ManagerDescriptor;

    fn on_init(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_deinit(&mut self) {}

    fn on_activate(&mut self, _predecessor: Option<&SharedManager>) -> Result<()> {
        Ok(())
    }

    fn on_deactivate(&mut self) {}

    /// Handoff: a replacement is about to take over this manager's slot
    fn on_replaced(&mut self, _incoming: &SharedManager) {}

    fn pre_update(&mut self, _dt: Duration) {}

    fn fixed_update(&mut self, _dt: Duration) {}

    fn update(&mut self, _dt: Duration) {}

    fn post_update(&mut self, _dt: Duration) {}

    /// Downcast seam for logging managers
    ///
    /// A manager whose type is the logging capability returns its record
    /// sink here so per-library log relays can flush into it.
    fn as_log_sink(&mut self) -> Option<&mut dyn LogSink> {
        None
    }
}

// =============================================================================
// ManagerHandle
// =============================================================================

/// A registered manager instance
///
/// Owns the boxed implementation plus the two lifecycle machines. The init
/// machine is driven by the owning library's registry; the activation
/// machine is driven exclusively by the activation coordinator. Each fires
/// its signal when a transition completes, with no lock held.
pub struct ManagerHandle {
    descriptor: ManagerDescriptor,
    /// Non-owning back-reference to the owning library; unset until the
    /// manager is registered
    owner: Mutex<Weak<LibraryInfo>>,
    init_state: Mutex<LifecycleState>,
    active_state: Mutex<LifecycleState>,
    manager: Mutex<Box<dyn Manager>>,
    init_signal: Signal,
    active_signal: Signal,
    weak_self: Weak<ManagerHandle>,
}

impl ManagerHandle {
    /// Wrap a manager implementation in a shared handle
    pub fn new(manager: impl Manager + 'static) -> SharedManager {
        Self::from_boxed(Box::new(manager))
    }

    pub fn from_boxed(manager: Box<dyn Manager>) -> SharedManager {
        let descriptor = manager.descriptor();
        Arc::new_cyclic(|weak_self| Self {
            descriptor,
            owner: Mutex::new(Weak::new()),
            init_state: Mutex::new(LifecycleState::Stopped),
            active_state: Mutex::new(LifecycleState::Stopped),
            manager: Mutex::new(manager),
            init_signal: Signal::new(),
            active_signal: Signal::new(),
            weak_self: weak_self.clone(),
        })
    }

    fn shared(&self) -> SharedManager {
        self.weak_self
            .upgrade()
            .expect("manager handle self-reference expired")
    }

    pub fn descriptor(&self) -> &ManagerDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> ManagerId {
        self.descriptor.id()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Bind the owning library back-reference
    pub fn bind_owner(&self, info: &Arc<LibraryInfo>) {
        *self.owner.lock().unwrap() = Arc::downgrade(info);
    }

    /// Clear the owner back-reference (library teardown)
    pub fn clear_owner(&self) {
        *self.owner.lock().unwrap() = Weak::new();
    }

    /// The owning library, if bound and still alive
    pub fn owner(&self) -> Option<Arc<LibraryInfo>> {
        self.owner.lock().unwrap().upgrade()
    }

    /// The owning library where one is required
    ///
    /// # Panics
    /// An unset or expired owner here is a protocol violation: the manager
    /// outlived (or never had) the library responsible for it.
    pub fn expect_owner(&self) -> Arc<LibraryInfo> {
        match self.owner() {
            Some(info) => info,
            None => panic!(
                "owning library reference expired for manager {}",
                self.descriptor
            ),
        }
    }

    // =========================================================================
    // Lifecycle State
    // =========================================================================

    pub fn init_state(&self) -> LifecycleState {
        *self.init_state.lock().unwrap()
    }

    pub fn active_state(&self) -> LifecycleState {
        *self.active_state.lock().unwrap()
    }

    pub fn is_initialized(&self) -> bool {
        self.init_state().is_started()
    }

    pub fn is_active(&self) -> bool {
        self.active_state().is_started()
    }

    /// Init-changed event stream
    pub fn init_signal(&self) -> &Signal {
        &self.init_signal
    }

    /// Activation-changed event stream
    pub fn active_signal(&self) -> &Signal {
        &self.active_signal
    }

    // =========================================================================
    // Init Machine
    // =========================================================================

    /// Run the init hook, Stopped -> Starting -> Started
    ///
    /// Idempotent: a manager that is already initialized is left as is.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut state = self.init_state.lock().unwrap();
            if state.is_started() {
                return Ok(());
            }
            state.transition_to(LifecycleState::Starting);
        }
        debug!(manager = %self.descriptor, "initializing manager");

        let outcome = self.manager.lock().unwrap().on_init();
        match outcome {
            Ok(()) => {
                self.init_state
                    .lock()
                    .unwrap()
                    .transition_to(LifecycleState::Started);
                self.init_signal.fire(&self.shared(), true);
                Ok(())
            }
            Err(e) => {
                error!(manager = %self.descriptor, error = %e, "manager init failed");
                self.init_state
                    .lock()
                    .unwrap()
                    .transition_to(LifecycleState::Stopped);
                Err(Error::ManagerInitFailed {
                    name: self.descriptor.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run the deinit hook, Started -> Stopping -> Stopped
    ///
    /// # Panics
    /// Deinitializing a manager that is still active is a protocol
    /// violation: deactivation must happen first.
    pub fn deinitialize(&self) {
        assert!(
            self.active_state().is_stopped(),
            "deinitializing active manager {}",
            self.descriptor
        );
        {
            let mut state = self.init_state.lock().unwrap();
            if state.is_stopped() {
                return;
            }
            state.transition_to(LifecycleState::Stopping);
        }
        debug!(manager = %self.descriptor, "deinitializing manager");

        self.manager.lock().unwrap().on_deinit();
        self.init_state
            .lock()
            .unwrap()
            .transition_to(LifecycleState::Stopped);
        self.init_signal.fire(&self.shared(), false);
    }

    // =========================================================================
    // Activation Machine (coordinator-driven)
    // =========================================================================

    /// Run the activation hook, Stopped -> Starting -> Started
    ///
    /// `predecessor` is the outgoing occupant of this manager's type slot,
    /// if a live one is being replaced.
    ///
    /// # Panics
    /// Activating a manager that has not completed init is a protocol
    /// violation.
    pub fn activate(&self, predecessor: Option<&SharedManager>) -> Result<()> {
        assert!(
            self.is_initialized(),
            "activating uninitialized manager {}",
            self.descriptor
        );
        self.active_state
            .lock()
            .unwrap()
            .transition_to(LifecycleState::Starting);
        debug!(manager = %self.descriptor, "activating manager");

        let outcome = self.manager.lock().unwrap().on_activate(predecessor);
        match outcome {
            Ok(()) => {
                self.active_state
                    .lock()
                    .unwrap()
                    .transition_to(LifecycleState::Started);
                self.active_signal.fire(&self.shared(), true);
                Ok(())
            }
            Err(e) => {
                error!(manager = %self.descriptor, error = %e, "manager activation failed");
                self.active_state
                    .lock()
                    .unwrap()
                    .transition_to(LifecycleState::Stopped);
                Err(Error::ManagerActivationFailed {
                    name: self.descriptor.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run the deactivation hook, Started -> Stopping -> Stopped
    ///
    /// Deactivating an already-stopped manager is a no-op.
    pub fn deactivate(&self) {
        {
            let mut state = self.active_state.lock().unwrap();
            if state.is_stopped() {
                return;
            }
            state.transition_to(LifecycleState::Stopping);
        }
        debug!(manager = %self.descriptor, "deactivating manager");

        self.manager.lock().unwrap().on_deactivate();
        self.active_state
            .lock()
            .unwrap()
            .transition_to(LifecycleState::Stopped);
        self.active_signal.fire(&self.shared(), false);
    }

    /// Invoke the handoff hook with the incoming replacement
    pub fn replaced(&self, incoming: &SharedManager) {
        debug!(
            outgoing = %self.descriptor,
            incoming = %incoming.descriptor(),
            "manager handoff"
        );
        self.manager.lock().unwrap().on_replaced(incoming);
    }

    // =========================================================================
    // Update Dispatch
    // =========================================================================

    pub fn pre_update(&self, dt: Duration) {
        self.manager.lock().unwrap().pre_update(dt);
    }

    pub fn fixed_update(&self, dt: Duration) {
        self.manager.lock().unwrap().fixed_update(dt);
    }

    pub fn update(&self, dt: Duration) {
        self.manager.lock().unwrap().update(dt);
    }

    pub fn post_update(&self, dt: Duration) {
        self.manager.lock().unwrap().post_update(dt);
    }

    /// Run `f` against the manager's log sink, if it exposes one
    ///
    /// Returns false when the manager is not a logging manager.
    pub fn with_log_sink(&self, f: impl FnOnce(&mut dyn LogSink)) -> bool {
        let mut manager = self.manager.lock().unwrap();
        match manager.as_log_sink() {
            Some(sink) => {
                f(sink);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("descriptor", &self.descriptor)
            .field("init_state", &self.init_state())
            .field("active_state", &self.active_state())
            .finish()
    }
}
