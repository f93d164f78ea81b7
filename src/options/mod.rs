//! Operation options and capability negotiation.
//!
//! [`OperationOptions`] carries the caller's paging, resolution flags and
//! filters. When created against a [`Caps`] the type filter is checked as it
//! is set; key and range filters are stored as given and only checked when
//! [`OperationOptions::obey_caps`] splits the options into what the source
//! supports and what it does not.

mod caps;

pub use caps::Caps;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use mediaweave_common::{keys, KeyId, ResolutionFlags, TypeFilter};

/// Bounds of a range filter. A missing side is open.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

/// Caller-supplied options for one operation.
///
/// `Clone` is a deep copy of every option; the caps reference is shared.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    caps: Option<Arc<Caps>>,
    skip: Option<u32>,
    count: Option<u32>,
    flags: Option<ResolutionFlags>,
    type_filter: Option<TypeFilter>,
    key_filters: BTreeMap<KeyId, Value>,
    range_filters: BTreeMap<KeyId, RangeFilter>,
}

/// Outcome of [`OperationOptions::obey_caps`].
#[derive(Debug, Clone)]
pub struct CapsCheck {
    /// `true` when nothing landed in `unsupported`.
    pub all_supported: bool,
    /// Options the source honours, bound to its caps.
    pub supported: OperationOptions,
    /// Filters the source does not declare.
    pub unsupported: OperationOptions,
}

impl OperationOptions {
    /// Create empty options, optionally bound to a source's caps.
    pub fn new(caps: Option<Arc<Caps>>) -> Self {
        Self {
            caps,
            ..Self::default()
        }
    }

    pub fn caps(&self) -> Option<&Arc<Caps>> {
        self.caps.as_ref()
    }

    /// Number of leading results to skip. Defaults to 0.
    pub fn skip(&self) -> u32 {
        self.skip.unwrap_or(0)
    }

    pub fn set_skip(&mut self, skip: u32) {
        self.skip = Some(skip);
    }

    /// Maximum number of results, `None` for unlimited.
    pub fn count(&self) -> Option<u32> {
        self.count
    }

    /// Set the result limit. `None` removes it.
    ///
    /// Any value is stored; the broker rejects a count below one.
    pub fn set_count<C: Into<Option<u32>>>(&mut self, count: C) {
        self.count = count.into();
    }

    pub fn resolution_flags(&self) -> ResolutionFlags {
        self.flags.unwrap_or_default()
    }

    pub fn set_resolution_flags(&mut self, flags: ResolutionFlags) {
        self.flags = Some(flags);
    }

    /// Type filter in effect. Defaults to every kind.
    pub fn type_filter(&self) -> TypeFilter {
        self.type_filter.unwrap_or_default()
    }

    /// Whether a type filter was set explicitly.
    pub fn has_type_filter(&self) -> bool {
        self.type_filter.is_some()
    }

    /// Set the type filter.
    ///
    /// Returns `false` and leaves the option unset when bound caps do not
    /// support filtering on every kind in `filter`.
    pub fn set_type_filter(&mut self, filter: TypeFilter) -> bool {
        if let Some(caps) = &self.caps {
            if !caps.test_type_filter(filter) {
                return false;
            }
        }
        self.type_filter = Some(filter);
        true
    }

    /// Require `key` to equal `value`.
    pub fn set_key_filter<V: Into<Value>>(&mut self, key: KeyId, value: V) {
        self.key_filters.insert(key, value.into());
    }

    pub fn key_filter(&self, key: &KeyId) -> Option<&Value> {
        self.key_filters.get(key)
    }

    pub fn key_filters(&self) -> impl Iterator<Item = (&KeyId, &Value)> {
        self.key_filters.iter()
    }

    /// Require `key` to lie within `min..=max`.
    ///
    /// Bounds outside the absolute limits registered for the key are clamped
    /// to those limits.
    pub fn set_range_filter(&mut self, key: KeyId, min: Option<Value>, max: Option<Value>) {
        let min = min.map(|v| keys::clamp_to_limits(&key, v));
        let max = max.map(|v| keys::clamp_to_limits(&key, v));
        self.range_filters.insert(key, RangeFilter { min, max });
    }

    pub fn range_filter(&self, key: &KeyId) -> Option<&RangeFilter> {
        self.range_filters.get(key)
    }

    pub fn range_filters(&self) -> impl Iterator<Item = (&KeyId, &RangeFilter)> {
        self.range_filters.iter()
    }

    #[must_use]
    pub fn with_skip(mut self, skip: u32) -> Self {
        self.set_skip(skip);
        self
    }

    #[must_use]
    pub fn with_count<C: Into<Option<u32>>>(mut self, count: C) -> Self {
        self.set_count(count);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ResolutionFlags) -> Self {
        self.set_resolution_flags(flags);
        self
    }

    /// Split these options into what `caps` supports and what it does not.
    ///
    /// Skip, count and flags are always supported. The type filter and every
    /// key and range filter land in exactly one of the two outputs.
    pub fn obey_caps(&self, caps: &Arc<Caps>) -> CapsCheck {
        let mut supported = OperationOptions::new(Some(Arc::clone(caps)));
        let mut unsupported = OperationOptions::new(None);
        let mut all_supported = true;

        supported.skip = self.skip;
        supported.count = self.count;
        supported.flags = self.flags;

        if let Some(filter) = self.type_filter {
            if caps.test_type_filter(filter) {
                supported.type_filter = Some(filter);
            } else {
                unsupported.type_filter = Some(filter);
                all_supported = false;
            }
        }

        for (key, value) in &self.key_filters {
            let side = if caps.is_key_filter(key) {
                &mut supported
            } else {
                all_supported = false;
                &mut unsupported
            };
            side.key_filters.insert(key.clone(), value.clone());
        }

        for (key, range) in &self.range_filters {
            let side = if caps.is_range_filter(key) {
                &mut supported
            } else {
                all_supported = false;
                &mut unsupported
            };
            side.range_filters.insert(key.clone(), range.clone());
        }

        CapsCheck {
            all_supported,
            supported,
            unsupported,
        }
    }

    /// Human readable names of the filters set on these options.
    pub fn filter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(filter) = self.type_filter {
            names.push(format!("type filter {:?}", filter));
        }
        names.extend(
            self.key_filters
                .keys()
                .map(|key| format!("equality filter '{}'", key)),
        );
        names.extend(
            self.range_filters
                .keys()
                .map(|key| format!("range filter '{}'", key)),
        );
        names
    }
}
