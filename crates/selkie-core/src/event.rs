//! Lifecycle change notification
//!
//! TigerStyle: Explicit observer seam, no callbacks under locks.
//!
//! Managers fire a boolean signal when an init or activation transition
//! completes; the activation coordinator fires the application-wide variant
//! after each applied change. Subscribers are held as weak references so a
//! dropped observer unsubscribes itself; expired entries are pruned on fire.

use crate::manager::SharedManager;
use std::sync::{Mutex, Weak};

/// Observer of lifecycle transitions
///
/// `entered` is true when the machine completed startup (reached Started)
/// and false when it completed shutdown (reached Stopped).
pub trait LifecycleObserver: Send + Sync {
    fn on_lifecycle_changed(&self, manager: &SharedManager, entered: bool);
}

/// One lifecycle event stream
///
/// Subscribers are notified after the state transition is complete and with
/// no lock held, so an observer may call back into the runtime.
pub struct Signal {
    observers: Mutex<Vec<Weak<dyn LifecycleObserver>>>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe a weak observer reference
    pub fn subscribe(&self, observer: Weak<dyn LifecycleObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Notify all live observers, pruning expired ones
    pub fn fire(&self, manager: &SharedManager, entered: bool) {
        let live: Vec<_> = {
            let mut observers = self.observers.lock().unwrap();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.on_lifecycle_changed(manager, entered);
        }
    }

    /// Number of currently live observers
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("observers", &self.observer_count())
            .finish()
    }
}
