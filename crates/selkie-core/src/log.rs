//! Per-library log bootstrap
//!
//! TigerStyle: Bounded buffers, no lock held across manager hooks.
//!
//! Every library can log from the moment it is constructed, before any
//! logging manager exists or is active. While no logging manager is bound,
//! records are buffered (bounded, oldest dropped). The relay observes the
//! application-wide activation notification: when a manager whose type id is
//! the logging capability activates, the relay binds it and flushes the
//! buffer in order; when the bound instance deactivates it unbinds and
//! resumes buffering; when a different instance of the type activates while
//! one is bound, it rebinds directly.

use crate::constants::LOG_RELAY_BUFFER_COUNT_MAX;
use crate::event::LifecycleObserver;
use crate::io::Clock;
use crate::manager::{ManagerId, SharedManager};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

/// Well-known type id of the logging capability
///
/// Every logging manager implementation reports this id in its descriptor;
/// the relay recognises the capability by it.
pub const LOG_MANAGER_ID: ManagerId = Uuid::from_u128(0x5e1f_1e00_4c6f_6700_8000_000000000001);

/// Well-known type name of the logging capability
pub const LOG_MANAGER_NAME: &str = "Log";

// =============================================================================
// Records
// =============================================================================

/// Severity of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// One buffered or delivered log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Clock milliseconds at the time of the call
    pub timestamp_ms: u64,
    pub message: String,
}

/// Record sink exposed by logging managers
pub trait LogSink {
    fn write(&mut self, record: &LogRecord);
}

// =============================================================================
// LogRelay
// =============================================================================

struct RelayState {
    buffer: VecDeque<LogRecord>,
    dropped_count: u64,
    bound: Option<SharedManager>,
}

/// Per-library log bootstrap relay
///
/// Owned by each library; subscribed (weakly) to the coordinator's
/// activation notification by the runtime when the library is loaded.
pub struct LogRelay {
    library_name: String,
    clock: Arc<dyn Clock>,
    state: Mutex<RelayState>,
}

impl LogRelay {
    pub fn new(library_name: impl Into<String>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            library_name: library_name.into(),
            clock,
            state: Mutex::new(RelayState {
                buffer: VecDeque::new(),
                dropped_count: 0,
                bound: None,
            }),
        })
    }

    /// Log a record, buffering if no logging manager is bound and active
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let record = LogRecord {
            level,
            timestamp_ms: self.clock.now_ms(),
            message: message.into(),
        };

        // Snapshot the binding, then write outside the relay lock: a sink
        // hook may itself log through another relay.
        let bound = {
            let state = self.state.lock().unwrap();
            state.bound.clone()
        };

        if let Some(manager) = bound {
            if manager.is_active() && manager.with_log_sink(|sink| sink.write(&record)) {
                return;
            }
        }
        self.buffer_record(record);
    }

    fn buffer_record(&self, record: LogRecord) {
        let mut state = self.state.lock().unwrap();
        if state.buffer.len() >= LOG_RELAY_BUFFER_COUNT_MAX {
            state.buffer.pop_front();
            state.dropped_count += 1;
        }
        state.buffer.push_back(record);
    }

    /// The currently bound logging manager, if any
    pub fn bound(&self) -> Option<SharedManager> {
        self.state.lock().unwrap().bound.clone()
    }

    /// Records currently waiting for a logging manager
    pub fn buffered_count(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    /// Records dropped at the buffer cap
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().unwrap().dropped_count
    }

    /// Bind a logging manager, flushing the buffer in order if it is active
    fn bind(&self, manager: &SharedManager) {
        {
            let mut state = self.state.lock().unwrap();
            state.bound = Some(manager.clone());
        }
        if manager.is_active() {
            self.flush();
        }
    }

    fn unbind(&self) {
        self.state.lock().unwrap().bound = None;
    }

    /// Flush buffered records into the bound sink, in order
    fn flush(&self) {
        // Drain under the lock, write outside it.
        let (bound, drained) = {
            let mut state = self.state.lock().unwrap();
            let bound = match state.bound.clone() {
                Some(b) => b,
                None => return,
            };
            let drained: Vec<LogRecord> = state.buffer.drain(..).collect();
            (bound, drained)
        };
        if drained.is_empty() {
            return;
        }

        let delivered = bound.with_log_sink(|sink| {
            for record in &drained {
                sink.write(record);
            }
        });
        if !delivered {
            warn!(
                library = %self.library_name,
                manager = %bound.descriptor(),
                "bound logging manager exposes no sink, records re-buffered"
            );
            let mut state = self.state.lock().unwrap();
            for record in drained.into_iter().rev() {
                state.buffer.push_front(record);
            }
        }
    }
}

impl LifecycleObserver for LogRelay {
    fn on_lifecycle_changed(&self, manager: &SharedManager, entered: bool) {
        if manager.id() != LOG_MANAGER_ID {
            return;
        }
        if entered {
            // Covers first bind and direct rebind to a replacement instance.
            self.bind(manager);
        } else {
            let is_bound_instance = {
                let state = self.state.lock().unwrap();
                state
                    .bound
                    .as_ref()
                    .is_some_and(|b| Arc::ptr_eq(b, manager))
            };
            if is_bound_instance {
                self.unbind();
            }
        }
    }
}

impl fmt::Debug for LogRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("LogRelay")
            .field("library", &self.library_name)
            .field("buffered", &state.buffer.len())
            .field("bound", &state.bound.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Manager, ManagerDescriptor, ManagerHandle};

    #[derive(Debug, Default, Clone)]
    struct Captured(Arc<Mutex<Vec<LogRecord>>>);

    struct TestLogManager {
        records: Captured,
    }

    impl Manager for TestLogManager {
        fn descriptor(&self) -> ManagerDescriptor {
            ManagerDescriptor::new(LOG_MANAGER_ID, LOG_MANAGER_NAME).unwrap()
        }
        fn as_log_sink(&mut self) -> Option<&mut dyn LogSink> {
            Some(self)
        }
    }

    impl LogSink for TestLogManager {
        fn write(&mut self, record: &LogRecord) {
            self.records.0.lock().unwrap().push(record.clone());
        }
    }

    #[derive(Debug)]
    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_us(&self) -> u64 {
            self.0
        }
        fn sleep_ms(&self, _ms: u64) {}
        fn spin_until_us(&self, _deadline_us: u64) {}
    }

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(42_000))
    }

    #[test]
    fn test_records_buffer_while_unbound() {
        let relay = LogRelay::new("Core", test_clock());
        relay.log(LogLevel::Info, "first");
        relay.log(LogLevel::Warn, "second");
        assert_eq!(relay.buffered_count(), 2);
        assert!(relay.bound().is_none());
    }

    #[test]
    fn test_bind_on_activation_flushes_in_order() {
        let records = Captured::default();
        let handle = ManagerHandle::new(TestLogManager {
            records: records.clone(),
        });
        handle.initialize().unwrap();
        handle.activate(None).unwrap();

        let relay = LogRelay::new("Core", test_clock());
        relay.log(LogLevel::Info, "first");
        relay.log(LogLevel::Error, "second");

        relay.on_lifecycle_changed(&handle, true);
        assert_eq!(relay.buffered_count(), 0);

        let captured = records.0.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].message, "first");
        assert_eq!(captured[1].message, "second");
        assert_eq!(captured[0].timestamp_ms, 42);
    }

    #[test]
    fn test_unbind_on_deactivation_resumes_buffering() {
        let records = Captured::default();
        let handle = ManagerHandle::new(TestLogManager {
            records: records.clone(),
        });
        handle.initialize().unwrap();
        handle.activate(None).unwrap();

        let relay = LogRelay::new("Core", test_clock());
        relay.on_lifecycle_changed(&handle, true);
        relay.log(LogLevel::Info, "live");
        assert_eq!(records.0.lock().unwrap().len(), 1);

        handle.deactivate();
        relay.on_lifecycle_changed(&handle, false);
        assert!(relay.bound().is_none());

        relay.log(LogLevel::Info, "buffered again");
        assert_eq!(relay.buffered_count(), 1);
    }

    #[test]
    fn test_foreign_manager_activation_is_ignored() {
        struct OtherManager;
        impl Manager for OtherManager {
            fn descriptor(&self) -> ManagerDescriptor {
                ManagerDescriptor::new(Uuid::new_v4(), "Window").unwrap()
            }
        }

        let handle = ManagerHandle::new(OtherManager);
        handle.initialize().unwrap();
        handle.activate(None).unwrap();

        let relay = LogRelay::new("Core", test_clock());
        relay.on_lifecycle_changed(&handle, true);
        assert!(relay.bound().is_none());
    }

    #[test]
    fn test_buffer_is_bounded() {
        let relay = LogRelay::new("Core", test_clock());
        for i in 0..(LOG_RELAY_BUFFER_COUNT_MAX + 10) {
            relay.log(LogLevel::Debug, format!("record {}", i));
        }
        assert_eq!(relay.buffered_count(), LOG_RELAY_BUFFER_COUNT_MAX);
        assert_eq!(relay.dropped_count(), 10);
    }
}
