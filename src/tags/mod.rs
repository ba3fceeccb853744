//! Request-scoped tag bag.
//!
//! # Data Flow
//! ```text
//! CallContext::new() creates one Tags per call
//!     → interceptors and the handler call tags().set(..)
//!     → span builder copies the early tags onto the span
//!     → reporters read values() on completion
//! ```
//!
//! # Design Decisions
//! - Cloning `Tags` clones the handle, not the contents; every layer of one
//!   call sees the same bag
//! - Keys are unique, last write wins, first-insertion order is kept for export
//! - Equality of snapshots ignores order

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// A scalar tag value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<&String> for TagValue {
    fn from(value: &String) -> Self {
        TagValue::Str(value.clone())
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(TagValue::Int)
            .unwrap_or_else(|_| TagValue::Str(value.to_string()))
    }
}

impl From<usize> for TagValue {
    fn from(value: usize) -> Self {
        TagValue::from(value as u64)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<f32> for TagValue {
    fn from(value: f32) -> Self {
        TagValue::Float(f64::from(value))
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

/// Per-call tag bag handle.
#[derive(Clone, Default)]
pub struct Tags {
    inner: Arc<Mutex<Vec<(String, TagValue)>>>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tag, overwriting any previous value for the key.
    ///
    /// Returns `self` so calls can be chained:
    /// `tags.set("user.id", 42).set("user.tier", "gold")`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<TagValue>) -> &Self {
        let key = key.into();
        let value = value.into();
        let mut entries = self.lock();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<TagValue> {
        self.lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().iter().any(|(k, _)| k == key)
    }

    /// Copy of the current contents.
    pub fn values(&self) -> TagValues {
        TagValues(self.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Only one call flow touches a bag; a poisoned lock still holds valid data.
    fn lock(&self) -> MutexGuard<'_, Vec<(String, TagValue)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tags").field(&self.values()).finish()
    }
}

/// Snapshot of a tag bag, in first-insertion order.
#[derive(Debug, Clone, Default)]
pub struct TagValues(Vec<(String, TagValue)>);

impl TagValues {
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a JSON object, keeping insertion order.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl PartialEq for TagValues {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl IntoIterator for TagValues {
    type Item = (String, TagValue);
    type IntoIter = std::vec::IntoIter<(String, TagValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for TagValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let tags = Tags::new();
        for (k, v) in iter {
            tags.set(k, v);
        }
        tags.values()
    }
}
