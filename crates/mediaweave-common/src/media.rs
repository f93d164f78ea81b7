//! The keyed metadata record exchanged between callers, the broker, and
//! providers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::{self, KeyId};
use crate::types::MediaKind;

/// One media item or container, described by a set of metadata keys.
///
/// The record is deliberately opaque: providers fill whatever keys they know
/// and the broker only reads the id, the source tag, and the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Source-specific identifier. `None` denotes a source's root container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Id of the source that emitted this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// What kind of item this is.
    pub kind: MediaKind,
    /// Metadata values keyed by [`KeyId`].
    #[serde(default)]
    pub values: BTreeMap<KeyId, Value>,
}

impl Media {
    /// Create an empty record of the given kind.
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Create an empty container record.
    pub fn container() -> Self {
        Self::new(MediaKind::Container)
    }

    /// Builder-style id setter.
    #[must_use]
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.set_id(id);
        self
    }

    /// Builder-style value setter.
    #[must_use]
    pub fn with<V: Into<Value>>(mut self, key: KeyId, value: V) -> Self {
        self.set(key, value);
        self
    }

    pub fn set_id<S: Into<String>>(&mut self, id: S) {
        self.id = Some(id.into());
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_source<S: Into<String>>(&mut self, source: S) {
        self.source = Some(source.into());
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_container(&self) -> bool {
        self.kind == MediaKind::Container
    }

    pub fn get(&self, key: &KeyId) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has(&self, key: &KeyId) -> bool {
        self.values.contains_key(key)
    }

    pub fn set<V: Into<Value>>(&mut self, key: KeyId, value: V) {
        self.values.insert(key, value.into());
    }

    pub fn remove(&mut self, key: &KeyId) -> Option<Value> {
        self.values.remove(key)
    }

    /// Keys that currently hold a value.
    pub fn keys(&self) -> impl Iterator<Item = &KeyId> {
        self.values.keys()
    }

    pub fn get_str(&self, key: &KeyId) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &KeyId) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str(&keys::TITLE)
    }

    pub fn url(&self) -> Option<&str> {
        self.get_str(&keys::URL)
    }

    /// Number of children of a container, or [`keys::CHILDCOUNT_UNKNOWN`].
    pub fn childcount(&self) -> i64 {
        self.get_i64(&keys::CHILDCOUNT)
            .unwrap_or(keys::CHILDCOUNT_UNKNOWN)
    }

    /// Copy the values of `keys` that `other` holds into this record.
    ///
    /// Returns how many values were copied.
    pub fn merge_keys(&mut self, other: &Media, keys: &[KeyId]) -> usize {
        let mut merged = 0;
        for key in keys {
            if let Some(value) = other.get(key) {
                self.values.insert(key.clone(), value.clone());
                merged += 1;
            }
        }
        merged
    }
}
