//! Recording managers for lifecycle and dispatch assertions
//!
//! TigerStyle: Observable side effects, explicit ordering.
//!
//! `RecordingManager` journals every hook invocation into a shared,
//! append-only journal so tests can assert exact hook order across
//! managers (the change handoff sequence in particular). `RecordingLog` is
//! a logging-capability manager that additionally captures relayed records.

use selkie_core::error::{Error, Result};
use selkie_core::log::{LogRecord, LogSink, LOG_MANAGER_ID, LOG_MANAGER_NAME};
use selkie_core::manager::{Manager, ManagerDescriptor, ManagerHandle, ManagerId, SharedManager};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One journaled hook invocation
///
/// Entries carry the instance label (not the type name) so two instances
/// of the same type are distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Init(String),
    Deinit(String),
    Activate {
        label: String,
        had_predecessor: bool,
    },
    Deactivate(String),
    /// The handoff hook on the outgoing instance
    Replaced(String),
    PreUpdate(String),
    FixedUpdate(String),
    Update(String),
    PostUpdate(String),
}

/// Shared, append-only hook journal
pub type Journal = Arc<Mutex<Vec<HookEvent>>>;

/// Create an empty journal
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot a journal's entries
pub fn journal_entries(journal: &Journal) -> Vec<HookEvent> {
    journal.lock().unwrap().clone()
}

// =============================================================================
// RecordingManager
// =============================================================================

/// A manager that journals every hook invocation
pub struct RecordingManager {
    descriptor: ManagerDescriptor,
    label: String,
    journal: Journal,
    fail_activation: bool,
}

impl RecordingManager {
    /// Build a shared handle with the given type identity and instance label
    pub fn shared(
        id: ManagerId,
        type_name: &str,
        label: impl Into<String>,
        journal: &Journal,
    ) -> SharedManager {
        ManagerHandle::new(Self {
            descriptor: ManagerDescriptor::new(id, type_name)
                .expect("valid test descriptor"),
            label: label.into(),
            journal: journal.clone(),
            fail_activation: false,
        })
    }

    /// Build a shared handle whose activation hook fails
    pub fn shared_failing_activation(
        id: ManagerId,
        type_name: &str,
        label: impl Into<String>,
        journal: &Journal,
    ) -> SharedManager {
        ManagerHandle::new(Self {
            descriptor: ManagerDescriptor::new(id, type_name)
                .expect("valid test descriptor"),
            label: label.into(),
            journal: journal.clone(),
            fail_activation: true,
        })
    }

    fn record(&self, event: HookEvent) {
        self.journal.lock().unwrap().push(event);
    }
}

impl Manager for RecordingManager {
    fn descriptor(&self) -> ManagerDescriptor {
        self.descriptor.clone()
    }

    fn on_init(&mut self) -> Result<()> {
        self.record(HookEvent::Init(self.label.clone()));
        Ok(())
    }

    fn on_deinit(&mut self) {
        self.record(HookEvent::Deinit(self.label.clone()));
    }

    fn on_activate(&mut self, predecessor: Option<&SharedManager>) -> Result<()> {
        if self.fail_activation {
            return Err(Error::Internal {
                message: format!("{} refuses activation", self.label),
            });
        }
        self.record(HookEvent::Activate {
            label: self.label.clone(),
            had_predecessor: predecessor.is_some(),
        });
        Ok(())
    }

    fn on_deactivate(&mut self) {
        self.record(HookEvent::Deactivate(self.label.clone()));
    }

    fn on_replaced(&mut self, _incoming: &SharedManager) {
        self.record(HookEvent::Replaced(self.label.clone()));
    }

    fn pre_update(&mut self, _dt: Duration) {
        self.record(HookEvent::PreUpdate(self.label.clone()));
    }

    fn fixed_update(&mut self, _dt: Duration) {
        self.record(HookEvent::FixedUpdate(self.label.clone()));
    }

    fn update(&mut self, _dt: Duration) {
        self.record(HookEvent::Update(self.label.clone()));
    }

    fn post_update(&mut self, _dt: Duration) {
        self.record(HookEvent::PostUpdate(self.label.clone()));
    }
}

// =============================================================================
// RecordingLog
// =============================================================================

/// A logging-capability manager that captures relayed records
pub struct RecordingLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingLog {
    /// Build a shared handle plus the capture buffer it writes into
    pub fn shared() -> (SharedManager, Arc<Mutex<Vec<LogRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let handle = ManagerHandle::new(Self {
            records: records.clone(),
        });
        (handle, records)
    }
}

impl Manager for RecordingLog {
    fn descriptor(&self) -> ManagerDescriptor {
        ManagerDescriptor::new(LOG_MANAGER_ID, LOG_MANAGER_NAME)
            .expect("valid log descriptor")
    }

    fn as_log_sink(&mut self) -> Option<&mut dyn LogSink> {
        Some(self)
    }
}

impl LogSink for RecordingLog {
    fn write(&mut self, record: &LogRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
