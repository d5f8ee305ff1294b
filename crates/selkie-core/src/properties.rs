//! Typed configuration property store
//!
//! TigerStyle: Explicit types, typed failures, bounded surprise.
//!
//! Named, typed, constant-or-mutable values with a modification
//! notification. Libraries register properties during init; the update
//! scheduler subscribes to the rate properties so pacing can be
//! reconfigured without a restart. Constant properties reject writes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, Weak};

/// A property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Observer of property modifications
pub trait PropertyObserver: Send + Sync {
    fn on_property_changed(&self, name: &str, value: &PropertyValue);
}

#[derive(Debug, Clone)]
struct PropertyEntry {
    value: PropertyValue,
    constant: bool,
}

/// The property store
///
/// Owned by the root runtime; mutation goes through it exclusively.
pub struct PropertyStore {
    entries: HashMap<String, PropertyEntry>,
    observers: Mutex<Vec<Weak<dyn PropertyObserver>>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a property
    ///
    /// # Errors
    /// Returns `PropertyAlreadyRegistered` on a name collision.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        value: PropertyValue,
        constant: bool,
    ) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::PropertyAlreadyRegistered { name });
        }
        self.entries.insert(name, PropertyEntry { value, constant });
        Ok(())
    }

    /// Remove a property
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        match self.entries.remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::PropertyNotFound { name: name.into() }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a property value
    pub fn get(&self, name: &str) -> Result<PropertyValue> {
        self.entries
            .get(name)
            .map(|e| e.value.clone())
            .ok_or_else(|| Error::PropertyNotFound { name: name.into() })
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value.as_int().ok_or_else(|| Error::PropertyTypeMismatch {
            name: name.into(),
            expected: "int",
            actual: value.type_name(),
        })
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        let value = self.get(name)?;
        value.as_float().ok_or_else(|| Error::PropertyTypeMismatch {
            name: name.into(),
            expected: "float",
            actual: value.type_name(),
        })
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        let value = self.get(name)?;
        value.as_bool().ok_or_else(|| Error::PropertyTypeMismatch {
            name: name.into(),
            expected: "bool",
            actual: value.type_name(),
        })
    }

    /// Modify a mutable property and notify observers
    ///
    /// # Errors
    /// - `PropertyNotFound` when the name is unknown
    /// - `PropertyConstant` when the property was registered constant
    /// - `PropertyTypeMismatch` when the new value changes the type
    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| Error::PropertyNotFound { name: name.into() })?;
        if entry.constant {
            return Err(Error::PropertyConstant { name: name.into() });
        }
        if std::mem::discriminant(&entry.value) != std::mem::discriminant(&value) {
            return Err(Error::PropertyTypeMismatch {
                name: name.into(),
                expected: entry.value.type_name(),
                actual: value.type_name(),
            });
        }
        entry.value = value.clone();
        self.notify(name, &value);
        Ok(())
    }

    /// Subscribe a weak observer reference
    pub fn subscribe(&self, observer: Weak<dyn PropertyObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn notify(&self, name: &str, value: &PropertyValue) {
        let live: Vec<_> = {
            let mut observers = self.observers.lock().unwrap();
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.on_property_changed(name, value);
        }
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn test_register_get_set() {
        let mut store = PropertyStore::new();
        store
            .register("engine.rate", PropertyValue::Int(60), false)
            .unwrap();

        assert_eq!(store.get_int("engine.rate").unwrap(), 60);
        store.set("engine.rate", PropertyValue::Int(120)).unwrap();
        assert_eq!(store.get_int("engine.rate").unwrap(), 120);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut store = PropertyStore::new();
        store
            .register("engine.rate", PropertyValue::Int(60), false)
            .unwrap();
        let err = store
            .register("engine.rate", PropertyValue::Int(30), false)
            .unwrap_err();
        assert!(matches!(err, Error::PropertyAlreadyRegistered { .. }));
    }

    #[test]
    fn test_constant_rejects_writes() {
        let mut store = PropertyStore::new();
        store
            .register("engine.name", PropertyValue::Str("selkie".into()), true)
            .unwrap();
        let err = store
            .set("engine.name", PropertyValue::Str("other".into()))
            .unwrap_err();
        assert!(matches!(err, Error::PropertyConstant { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut store = PropertyStore::new();
        store
            .register("engine.rate", PropertyValue::Int(60), false)
            .unwrap();
        let err = store
            .set("engine.rate", PropertyValue::Str("fast".into()))
            .unwrap_err();
        assert!(matches!(err, Error::PropertyTypeMismatch { .. }));
    }

    #[test]
    fn test_modification_notifies_observers() {
        struct Recorder(StdMutex<Vec<(String, PropertyValue)>>);
        impl PropertyObserver for Recorder {
            fn on_property_changed(&self, name: &str, value: &PropertyValue) {
                self.0.lock().unwrap().push((name.into(), value.clone()));
            }
        }

        let mut store = PropertyStore::new();
        store
            .register("engine.rate", PropertyValue::Int(60), false)
            .unwrap();

        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        store.subscribe(Arc::downgrade(&recorder) as Weak<dyn PropertyObserver>);

        store.set("engine.rate", PropertyValue::Int(30)).unwrap();
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "engine.rate");
        assert_eq!(seen[0].1, PropertyValue::Int(30));
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let mut store = PropertyStore::new();
        store
            .register("engine.rate", PropertyValue::Int(60), false)
            .unwrap();

        struct Nop;
        impl PropertyObserver for Nop {
            fn on_property_changed(&self, _name: &str, _value: &PropertyValue) {}
        }
        let observer = Arc::new(Nop);
        store.subscribe(Arc::downgrade(&observer) as Weak<dyn PropertyObserver>);
        drop(observer);

        // Must not panic or deliver to the dropped observer
        store.set("engine.rate", PropertyValue::Int(10)).unwrap();
    }
}
