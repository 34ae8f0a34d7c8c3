//! Route values and route data
//!
//! Route value keys compare case-insensitively. A value may be missing,
//! null or empty; selection treats null and empty the same way.

use std::collections::BTreeMap;
use std::fmt;

/// Case-insensitive map of route values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RouteValues {
    values: BTreeMap<String, Option<String>>,
}

impl RouteValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, Some(value.into()));
        self
    }

    /// Builder-style insert of a possibly null value
    pub fn with_optional(mut self, key: impl AsRef<str>, value: Option<impl Into<String>>) -> Self {
        self.insert(key, value.map(Into::into));
        self
    }

    pub fn insert(&mut self, key: impl AsRef<str>, value: Option<String>) {
        self.values.insert(normalize_key(key.as_ref()), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        self.values.remove(&normalize_key(key))
    }

    /// Value for `key`; `None` when missing or null
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&normalize_key(key))
            .and_then(|value| value.as_deref())
    }

    /// Value for `key` with missing and null collapsed to `""`
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&normalize_key(key))
    }

    /// Iterate over normalized keys and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for RouteValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RouteValues {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut values = RouteValues::new();
        for (key, value) in iter {
            values.insert(key, Some(value.into()));
        }
        values
    }
}

pub(crate) fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// Route values compare case-insensitively too.
pub(crate) fn normalize_value(value: Option<&str>) -> String {
    value.unwrap_or("").to_ascii_lowercase()
}

/// Route data produced by routing for one request
#[derive(Debug, Clone, Default)]
pub struct RouteData {
    pub values: RouteValues,
    pub data_tokens: BTreeMap<String, String>,
}

impl RouteData {
    pub fn new(values: RouteValues) -> Self {
        Self {
            values,
            data_tokens: BTreeMap::new(),
        }
    }
}
