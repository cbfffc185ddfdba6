//! The dynamic attribute bag.

use crate::errors::DocflowError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Untyped attributes keyed by name.
///
/// Written by stage default factories and handlers, read by later stages
/// and handlers. Unlike options, values are stored as given (no
/// flattening) and may be overwritten freely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    data: HashMap<String, Value>,
}

impl AttributeBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Gets a value, failing if it was never written.
    pub fn require(&self, name: &str) -> Result<&Value, DocflowError> {
        self.get(name)
            .ok_or_else(|| DocflowError::missing_attribute(name))
    }

    /// Gets a string attribute as a path.
    #[must_use]
    pub fn get_path(&self, name: &str) -> Option<PathBuf> {
        self.get(name).and_then(Value::as_str).map(PathBuf::from)
    }

    /// Gets a path attribute, failing if it is absent or not a string.
    pub fn require_path(&self, name: &str) -> Result<PathBuf, DocflowError> {
        self.get_path(name)
            .ok_or_else(|| DocflowError::missing_attribute(name))
    }

    /// Checks if an attribute exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.data.remove(name)
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns all attribute names, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }
}
