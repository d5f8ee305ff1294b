//! Activation coordinator
//!
//! TigerStyle: Single activation guarantee, staged mutation, apply at the
//! tick boundary.
//!
//! The coordinator owns the one global active-singleton table: one slot per
//! manager *type*, holding the implementation currently visible to the rest
//! of the runtime. Nothing else mutates that table. Requests from any
//! thread are cheap staging operations under one dedicated lock; the update
//! scheduler calls [`ActivationCoordinator::apply_pending`] once per tick,
//! before dispatch, so the set of active managers one full tick observes
//! never changes mid-tick.
//!
//! Apply order is removes, then adds, then changes, an explicit invariant
//! pinned by tests. A Change is the handoff point: the outgoing occupant
//! sees the incoming replacement (`on_replaced`) before it deactivates, and
//! the incoming one activates with the predecessor reference.
//!
//! No lock is held across any manager hook, so a hook may call back into
//! staging; the request lands in the next tick's change set.

use selkie_core::error::{Error, Result};
use selkie_core::event::{LifecycleObserver, Signal};
use selkie_core::manager::{ManagerDescriptor, ManagerId, SharedManager};
use std::collections::HashMap;
use std::sync::{Mutex, Weak};
use tracing::{debug, warn};

// =============================================================================
// ActiveTable
// =============================================================================

/// The global active-singleton table
///
/// Dense, append-only slot array plus id/name index maps. A slot's value
/// becomes `None` (tombstone) when its occupant deactivates, but the index
/// mappings are retained: once a type has been mapped, it keeps its
/// position for the lifetime of the table.
struct ActiveTable {
    slots: Vec<Option<SharedManager>>,
    by_id: HashMap<ManagerId, usize>,
    by_name: HashMap<String, usize>,
}

impl ActiveTable {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// The mapped index for a type, live or tombstoned
    fn mapped_index(&self, id: ManagerId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    fn live_by_id(&self, id: ManagerId) -> Option<SharedManager> {
        self.mapped_index(id)
            .and_then(|index| self.slots.get(index))
            .and_then(|slot| slot.clone())
    }

    fn live_by_name(&self, name: &str) -> Option<SharedManager> {
        self.by_name
            .get(name)
            .and_then(|index| self.slots.get(*index))
            .and_then(|slot| slot.clone())
    }

    /// Map a type to its slot, allocating a new slot at the end on first use
    fn map_or_allocate(&mut self, descriptor: &ManagerDescriptor) -> usize {
        if let Some(index) = self.by_id.get(&descriptor.id()) {
            // Both maps must agree once either mapping exists.
            debug_assert_eq!(
                self.by_name.get(descriptor.name()),
                Some(index),
                "active table id/name maps disagree for {}",
                descriptor
            );
            return *index;
        }
        let index = self.slots.len();
        self.slots.push(None);
        self.by_id.insert(descriptor.id(), index);
        self.by_name.insert(descriptor.name().to_string(), index);
        index
    }

    fn set(&mut self, index: usize, manager: SharedManager) {
        assert!(index < self.slots.len(), "active slot index out of bounds");
        self.slots[index] = Some(manager);
    }

    fn clear(&mut self, index: usize) {
        assert!(index < self.slots.len(), "active slot index out of bounds");
        self.slots[index] = None;
    }

    fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Live occupants in slot order
    fn snapshot_live(&self) -> Vec<SharedManager> {
        self.slots.iter().filter_map(|slot| slot.clone()).collect()
    }
}

// =============================================================================
// Pending Changes
// =============================================================================

/// Staged activation changes, drained exactly once per tick
#[derive(Default)]
struct ChangeSet {
    /// New occupants for types with no mapped index yet
    to_add: Vec<SharedManager>,
    /// Replacements for types that already have a mapped index
    to_change: Vec<SharedManager>,
    /// Occupants staged for eviction
    to_remove: Vec<SharedManager>,
}

impl ChangeSet {
    fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_change.is_empty() && self.to_remove.is_empty()
    }

    fn len(&self) -> usize {
        self.to_add.len() + self.to_change.len() + self.to_remove.len()
    }

    /// Find a staged add/change for the same type, by id
    fn staged_for_type(&mut self, id: ManagerId) -> Option<&mut SharedManager> {
        self.to_add
            .iter_mut()
            .chain(self.to_change.iter_mut())
            .find(|staged| staged.id() == id)
    }

    /// Drop a staged add/change for the type; true if one was removed
    fn cancel_type(&mut self, id: ManagerId) -> bool {
        let before = self.len();
        self.to_add.retain(|staged| staged.id() != id);
        self.to_change.retain(|staged| staged.id() != id);
        before != self.len()
    }

    /// Drop a staged removal of this exact instance; true if one was removed
    fn cancel_removal(&mut self, manager: &SharedManager) -> bool {
        let before = self.to_remove.len();
        self.to_remove
            .retain(|staged| !std::sync::Arc::ptr_eq(staged, manager));
        before != self.to_remove.len()
    }

    /// Drop every staged entry referencing this exact instance
    fn cancel_instance(&mut self, manager: &SharedManager) {
        self.to_add
            .retain(|staged| !std::sync::Arc::ptr_eq(staged, manager));
        self.to_change
            .retain(|staged| !std::sync::Arc::ptr_eq(staged, manager));
        self.to_remove
            .retain(|staged| !std::sync::Arc::ptr_eq(staged, manager));
    }
}

struct CoordinatorState {
    table: ActiveTable,
    pending: ChangeSet,
}

// =============================================================================
// ActivationCoordinator
// =============================================================================

/// Owner of the active-singleton table and its pending-change queue
pub struct ActivationCoordinator {
    state: Mutex<CoordinatorState>,
    activation_signal: Signal,
}

impl ActivationCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                table: ActiveTable::new(),
                pending: ChangeSet::default(),
            }),
            activation_signal: Signal::new(),
        }
    }

    // =========================================================================
    // Staging (any thread)
    // =========================================================================

    /// Stage a manager for activation at the next tick boundary
    ///
    /// Cancels a pending removal of the same instance; re-requesting an
    /// already-staged instance is a no-op; a staged request for the same
    /// type with a different instance is replaced (the later request wins).
    /// Otherwise the request is classified by whether the type already has
    /// a mapped index: Change if so, Add if not.
    ///
    /// # Panics
    /// The manager must have a live owning library; an expired owner here
    /// is a protocol violation.
    pub fn request_activate(&self, manager: SharedManager) -> Result<()> {
        let owner = manager.expect_owner();
        let mut state = self.state.lock().unwrap();

        if state.pending.cancel_removal(&manager) {
            debug!(manager = %manager.descriptor(), "pending removal cancelled by activate");
            return Ok(());
        }
        if state
            .table
            .live_by_id(manager.id())
            .is_some_and(|live| std::sync::Arc::ptr_eq(&live, &manager))
        {
            // Already the live occupant; re-requesting it also withdraws
            // any staged replacement.
            state.pending.cancel_type(manager.id());
            return Ok(());
        }
        if let Some(staged) = state.pending.staged_for_type(manager.id()) {
            if std::sync::Arc::ptr_eq(staged, &manager) {
                return Ok(());
            }
            debug!(
                manager = %manager.descriptor(),
                "staged activation replaced by later request"
            );
            *staged = manager;
            return Ok(());
        }

        if state.table.mapped_index(manager.id()).is_some() {
            debug!(manager = %manager.descriptor(), library = %owner.name(), "staged as change");
            state.pending.to_change.push(manager);
        } else {
            debug!(manager = %manager.descriptor(), library = %owner.name(), "staged as add");
            state.pending.to_add.push(manager);
        }
        Ok(())
    }

    /// Stage the live occupant of a type for deactivation
    ///
    /// A pending add/change for the type is cancelled instead (no table
    /// mutation needed, neither hook will fire). Fails with
    /// `ManagerNotActive` when the type has neither a staged entry nor a
    /// live occupant.
    pub fn request_deactivate(&self, id: ManagerId) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.pending.cancel_type(id) {
            debug!(%id, "pending activation cancelled by deactivate");
            return Ok(());
        }
        match state.table.live_by_id(id) {
            Some(occupant) => {
                debug!(manager = %occupant.descriptor(), "staged for removal");
                state.pending.to_remove.push(occupant);
                Ok(())
            }
            None => Err(Error::ManagerNotActive { key: id.to_string() }),
        }
    }

    /// Stage the live occupant of a type for deactivation, by type name
    pub fn request_deactivate_by_name(&self, name: &str) -> Result<()> {
        let id = {
            let state = self.state.lock().unwrap();
            state.table.live_by_name(name).map(|occupant| occupant.id())
        };
        match id {
            Some(id) => self.request_deactivate(id),
            None => Err(Error::ManagerNotActive {
                key: name.to_string(),
            }),
        }
    }

    // =========================================================================
    // Apply (main thread, once per tick)
    // =========================================================================

    /// Drain and apply the staged change set: removes, then adds, then
    /// changes
    ///
    /// Idempotent: applying an empty change set does nothing. The staged
    /// set is drained atomically, so requests issued from inside a hook
    /// affect the next tick. Manager hooks run with no lock held.
    pub fn apply_pending(&self) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            std::mem::take(&mut state.pending)
        };
        if pending.is_empty() {
            return;
        }
        debug!(
            removes = pending.to_remove.len(),
            adds = pending.to_add.len(),
            changes = pending.to_change.len(),
            "applying staged activation changes"
        );

        for outgoing in pending.to_remove {
            self.apply_remove(outgoing);
        }
        for incoming in pending.to_add {
            self.apply_add(incoming);
        }
        for incoming in pending.to_change {
            self.apply_change(incoming);
        }
    }

    fn apply_remove(&self, outgoing: SharedManager) {
        let cleared = {
            let mut state = self.state.lock().unwrap();
            match state.table.mapped_index(outgoing.id()) {
                Some(index)
                    if state.table.slots[index]
                        .as_ref()
                        .is_some_and(|live| std::sync::Arc::ptr_eq(live, &outgoing)) =>
                {
                    state.table.clear(index);
                    true
                }
                _ => false,
            }
        };
        if !cleared {
            // Evicted or replaced after staging; nothing left to do.
            return;
        }
        outgoing.deactivate();
        self.activation_signal.fire(&outgoing, false);
    }

    fn apply_add(&self, incoming: SharedManager) {
        let index = {
            let mut state = self.state.lock().unwrap();
            let index = state.table.map_or_allocate(incoming.descriptor());
            debug_assert!(
                state.table.slots[index].is_none(),
                "add applied over a live occupant for {}",
                incoming.descriptor()
            );
            state.table.set(index, incoming.clone());
            index
        };
        self.finish_activation(incoming, None, index);
    }

    fn apply_change(&self, incoming: SharedManager) {
        let (outgoing, index) = {
            let mut state = self.state.lock().unwrap();
            let index = state
                .table
                .mapped_index(incoming.id())
                .unwrap_or_else(|| {
                    // The queueing rule guarantees the mapping existed at
                    // stage time, and mappings are never removed.
                    panic!(
                        "change staged for unmapped type {}",
                        incoming.descriptor()
                    )
                });
            let outgoing = state.table.slots[index].clone();
            if outgoing.is_none() {
                // Tombstoned since staging (removal applied earlier this
                // tick): degrade to an add, no handoff, no predecessor.
                state.table.set(index, incoming.clone());
            }
            (outgoing, index)
        };

        let Some(outgoing) = outgoing else {
            self.finish_activation(incoming, None, index);
            return;
        };
        if std::sync::Arc::ptr_eq(&outgoing, &incoming) {
            // Self-replacement is a no-op; the occupant stays active.
            return;
        }

        // Handoff: the outgoing occupant sees its replacement, deactivates,
        // then the incoming occupant activates with the predecessor.
        outgoing.replaced(&incoming);
        outgoing.deactivate();
        self.activation_signal.fire(&outgoing, false);

        {
            let mut state = self.state.lock().unwrap();
            state.table.set(index, incoming.clone());
        }
        self.finish_activation(incoming, Some(outgoing), index);
    }

    fn finish_activation(
        &self,
        incoming: SharedManager,
        predecessor: Option<SharedManager>,
        index: usize,
    ) {
        match incoming.activate(predecessor.as_ref()) {
            Ok(()) => {
                self.activation_signal.fire(&incoming, true);
            }
            Err(e) => {
                warn!(
                    manager = %incoming.descriptor(),
                    error = %e,
                    "activation failed, slot tombstoned"
                );
                let mut state = self.state.lock().unwrap();
                if state.table.slots[index]
                    .as_ref()
                    .is_some_and(|live| std::sync::Arc::ptr_eq(live, &incoming))
                {
                    state.table.clear(index);
                }
            }
        }
    }

    // =========================================================================
    // Eviction (unregistration path)
    // =========================================================================

    /// Remove a manager from the table and the staged set immediately
    ///
    /// Used when the owning library unregisters the manager: the next tick
    /// must not observe it. Deactivation fires if it was live.
    pub fn evict(&self, manager: &SharedManager) {
        let was_live = {
            let mut state = self.state.lock().unwrap();
            state.pending.cancel_instance(manager);
            match state.table.mapped_index(manager.id()) {
                Some(index)
                    if state.table.slots[index]
                        .as_ref()
                        .is_some_and(|live| std::sync::Arc::ptr_eq(live, manager)) =>
                {
                    state.table.clear(index);
                    true
                }
                _ => false,
            }
        };
        if was_live {
            debug!(manager = %manager.descriptor(), "evicted from active table");
            manager.deactivate();
            self.activation_signal.fire(manager, false);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The live occupant for a type id
    pub fn active_by_id(&self, id: ManagerId) -> Result<SharedManager> {
        self.state
            .lock()
            .unwrap()
            .table
            .live_by_id(id)
            .ok_or_else(|| Error::ManagerNotActive { key: id.to_string() })
    }

    /// The live occupant for a type name
    pub fn active_by_name(&self, name: &str) -> Result<SharedManager> {
        self.state
            .lock()
            .unwrap()
            .table
            .live_by_name(name)
            .ok_or_else(|| Error::ManagerNotActive {
                key: name.to_string(),
            })
    }

    /// Live occupants in slot order, the per-tick dispatch snapshot
    pub fn snapshot_active(&self) -> Vec<SharedManager> {
        self.state.lock().unwrap().table.snapshot_live()
    }

    /// Number of live occupants
    pub fn active_count(&self) -> usize {
        self.state.lock().unwrap().table.live_count()
    }

    /// Number of staged, not yet applied requests
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Subscribe to the application-wide activation notification
    pub fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) {
        self.activation_signal.subscribe(observer);
    }
}

impl Default for ActivationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActivationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ActivationCoordinator")
            .field("active", &state.table.live_count())
            .field("slots", &state.table.slots.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
