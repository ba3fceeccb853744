//! Wire metadata carrier.
//!
//! A thin wrapper over [`http::HeaderMap`]: keys are case-insensitive and a
//! key may carry several values. Tracers read and write propagation headers
//! through it.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid metadata key {key:?}")]
    InvalidKey { key: String },

    #[error("invalid metadata value for key {key:?}")]
    InvalidValue { key: String },
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Build from `(key, value)` pairs, appending repeated keys.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, MetadataError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut md = Self::new();
        for (key, value) in pairs {
            md.append(key, value)?;
        }
        Ok(md)
    }

    /// First value for `key`, if present and valid text.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// All text values for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Replace every value of `key` with `value`.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), MetadataError> {
        let (name, value) = Self::parse(key, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add `value` to `key`, keeping existing values.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), MetadataError> {
        let (name, value) = Self::parse(key, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.headers.remove(key);
    }

    /// Distinct keys, lowercase.
    pub fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn as_headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn parse(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), MetadataError> {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| MetadataError::InvalidKey {
            key: key.to_string(),
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| MetadataError::InvalidValue {
            key: key.to_string(),
        })?;
        Ok((name, value))
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::from_headers(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut md = Metadata::new();
        md.insert("Uber-Trace-Id", "abc").unwrap();
        assert_eq!(md.get("uber-trace-id"), Some("abc"));
        assert_eq!(md.get("UBER-TRACE-ID"), Some("abc"));
        assert!(md.contains_key("uber-trace-id"));
        assert_eq!(md.keys(), vec!["uber-trace-id"]);
    }

    #[test]
    fn test_multiple_values() {
        let md = Metadata::from_pairs([("x-tag", "one"), ("x-tag", "two"), ("other", "3")]).unwrap();
        assert_eq!(md.get_all("x-tag"), vec!["one", "two"]);
        assert_eq!(md.get("x-tag"), Some("one"));
        assert_eq!(md.len(), 3);
    }

    #[test]
    fn test_insert_replaces() {
        let mut md = Metadata::from_pairs([("k", "a"), ("k", "b")]).unwrap();
        md.insert("k", "c").unwrap();
        assert_eq!(md.get_all("k"), vec!["c"]);
        md.remove("k");
        assert!(md.is_empty());
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let mut md = Metadata::new();
        assert!(matches!(
            md.insert("bad key", "v"),
            Err(MetadataError::InvalidKey { .. })
        ));
        assert!(matches!(
            md.insert("key", "line\nbreak"),
            Err(MetadataError::InvalidValue { .. })
        ));
        assert!(md.is_empty());
    }
}
