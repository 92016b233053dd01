//! Event attributes: validated string keys mapped to scalar or nested values.

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("Invalid attribute key: {0:?}")]
    InvalidKey(String),
    #[error("Attribute {0:?} holds a NaN or infinite number")]
    NonFiniteNumber(String),
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Object(Attributes),
}

impl AttributeValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Attributes> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// False if any number in the value, nested ones included, is NaN or
    /// infinite. JSON has no representation for those.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Double(d) => d.is_finite(),
            Self::Array(items) => items.iter().all(Self::is_finite),
            Self::Object(attrs) => attrs.values().all(Self::is_finite),
            Self::Bool(_) | Self::Integer(_) | Self::String(_) => true,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Attributes> for AttributeValue {
    fn from(value: Attributes) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for AttributeValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

/// Returns true if `key` may be used as an attribute key.
///
/// Keys start with an ASCII letter or underscore and continue with ASCII
/// alphanumerics or underscores.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Key-ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a value, returning the previous value for the key.
    ///
    /// # Errors
    /// Returns `AttributeError::InvalidKey` if the key fails validation, or
    /// `AttributeError::NonFiniteNumber` if the value contains NaN or an
    /// infinity.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<Option<AttributeValue>, AttributeError> {
        let key = key.into();
        if !is_valid_key(&key) {
            return Err(AttributeError::InvalidKey(key));
        }
        let value = value.into();
        if !value.is_finite() {
            return Err(AttributeError::NonFiniteNumber(key));
        }
        Ok(self.0.insert(key, value))
    }

    /// Builder-style insert.
    ///
    /// # Errors
    /// Same as [`Attributes::insert`].
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<Self, AttributeError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Insert under a key known at compile time to be valid.
    pub(crate) fn insert_static(&mut self, key: &'static str, value: impl Into<AttributeValue>) {
        debug_assert!(is_valid_key(key), "invalid static attribute key {key}");
        self.0.insert(key.to_owned(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AttributeValue> {
        self.0.iter()
    }

    pub fn values(&self) -> btree_map::Values<'_, String, AttributeValue> {
        self.0.values()
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = btree_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
