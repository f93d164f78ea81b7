//! Metadata key identifiers and the catalog of well-known keys.
//!
//! Sources declare which [`KeyId`]s they can supply, callers request keys by
//! id, and range filters on numeric keys are clamped to the absolute limits
//! registered here.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of a metadata field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Cow<'static, str>);

impl KeyId {
    /// Create a key for a well-known static name.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create a key for a runtime-defined name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The key name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for KeyId {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

pub const ID: KeyId = KeyId::from_static("id");
pub const TITLE: KeyId = KeyId::from_static("title");
pub const URL: KeyId = KeyId::from_static("url");
pub const ARTIST: KeyId = KeyId::from_static("artist");
pub const ALBUM: KeyId = KeyId::from_static("album");
pub const GENRE: KeyId = KeyId::from_static("genre");
pub const AUTHOR: KeyId = KeyId::from_static("author");
pub const DESCRIPTION: KeyId = KeyId::from_static("description");
pub const SITE: KeyId = KeyId::from_static("site");
pub const THUMBNAIL: KeyId = KeyId::from_static("thumbnail");
pub const MIME: KeyId = KeyId::from_static("mime");
pub const LYRICS: KeyId = KeyId::from_static("lyrics");
pub const DATE: KeyId = KeyId::from_static("date");
pub const DURATION: KeyId = KeyId::from_static("duration");
pub const CHILDCOUNT: KeyId = KeyId::from_static("childcount");
pub const RATING: KeyId = KeyId::from_static("rating");
pub const PLAY_COUNT: KeyId = KeyId::from_static("play-count");
pub const LAST_POSITION: KeyId = KeyId::from_static("last-position");
pub const BITRATE: KeyId = KeyId::from_static("bitrate");
pub const WIDTH: KeyId = KeyId::from_static("width");
pub const HEIGHT: KeyId = KeyId::from_static("height");
pub const FRAMERATE: KeyId = KeyId::from_static("framerate");
pub const TRACK_NUMBER: KeyId = KeyId::from_static("track-number");

/// Value used for [`CHILDCOUNT`] when a container cannot tell its size.
pub const CHILDCOUNT_UNKNOWN: i64 = -1;

/// Absolute bounds a numeric key can take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyLimits {
    pub min: f64,
    pub max: f64,
}

impl KeyLimits {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a filter value into these limits.
    ///
    /// Integers stay integers. Non-numeric values are returned untouched.
    pub fn clamp(&self, value: Value) -> Value {
        if let Some(n) = value.as_i64() {
            let lo = if self.min.is_finite() { self.min as i64 } else { i64::MIN };
            let hi = if self.max.is_finite() { self.max as i64 } else { i64::MAX };
            return Value::from(n.clamp(lo, hi));
        }
        if let Some(n) = value.as_f64() {
            return Value::from(n.clamp(self.min, self.max));
        }
        value
    }
}

/// Absolute limits registered for well-known numeric keys.
pub fn limits(key: &KeyId) -> Option<KeyLimits> {
    let limits = match key.as_str() {
        "rating" => KeyLimits::new(0.0, 5.0),
        "duration" | "play-count" | "last-position" | "bitrate" | "width" | "height"
        | "framerate" => KeyLimits::new(0.0, f64::INFINITY),
        "track-number" => KeyLimits::new(1.0, f64::INFINITY),
        "childcount" => KeyLimits::new(CHILDCOUNT_UNKNOWN as f64, f64::INFINITY),
        _ => return None,
    };
    Some(limits)
}

/// Clamp `value` to the limits of `key`, if any are registered.
pub fn clamp_to_limits(key: &KeyId, value: Value) -> Value {
    match limits(key) {
        Some(limits) => limits.clamp(value),
        None => value,
    }
}
