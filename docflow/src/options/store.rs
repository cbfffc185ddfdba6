//! The flat option store.

use super::flatten::{flatten, option_is_false, option_is_true, render_value};
use crate::errors::DocflowError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A flat, insertion-ordered map of dotted keys to option values.
///
/// Nested mappings never survive insertion: [`Options::set`] decomposes them
/// into one entry per leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    entries: IndexMap<String, Value>,
}

impl Options {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a (possibly nested) JSON value.
    ///
    /// A mapping is flattened from the root; any other value yields an
    /// empty store.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut options = Self::new();
        if value.is_object() {
            options.extend_flat(flatten(value, ""));
        }
        options
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value under `key` rendered as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_null()).map(render_value)
    }

    /// Returns the value under `key`, failing if it is absent.
    pub fn require(&self, key: &str) -> Result<&Value, DocflowError> {
        self.get(key).ok_or_else(|| DocflowError::missing_option(key))
    }

    /// Interprets the value under `key` as a boolean token.
    ///
    /// An absent (or null) key returns `default` when one is supplied. A
    /// value matching neither token set is an error.
    pub fn get_boolean(&self, key: &str, default: Option<bool>) -> Result<bool, DocflowError> {
        let value = self.get(key).filter(|v| !v.is_null());

        match (value, default) {
            (None, Some(default)) => Ok(default),
            (None, None) => Err(DocflowError::invalid_boolean(key, "none")),
            (Some(v), _) if option_is_false(v) => Ok(false),
            (Some(v), _) if option_is_true(v) => Ok(true),
            (Some(v), _) => Err(DocflowError::invalid_boolean(key, render_value(v))),
        }
    }

    /// Returns every entry under `<prefix>.`, with the prefix stripped, in
    /// insertion order.
    #[must_use]
    pub fn get_namespaced(&self, prefix: &str) -> Vec<(String, Value)> {
        let namespace = format!("{prefix}.");
        self.entries
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&namespace)
                    .map(|suffix| (suffix.to_string(), value.clone()))
            })
            .collect()
    }

    /// Stores `value` under `key`, flattening nested mappings under `key.`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match value.into() {
            mapping @ Value::Object(_) => {
                self.entries.shift_remove(&key);
                self.extend_flat(flatten(mapping, &key));
            }
            leaf => {
                self.entries.insert(key, leaf);
            }
        }
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Applies `other` on top of this store; later keys overwrite.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn extend_flat(&mut self, pairs: Vec<(String, Value)>) {
        self.entries.extend(pairs);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}
