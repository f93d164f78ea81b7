//! Capability descriptors.
//!
//! A [`Caps`] value declares which filters and paging a source honours for
//! one operation. Sources build it once and share it behind an `Arc`.

use std::collections::BTreeSet;

use mediaweave_common::{KeyId, TypeFilter};

/// Filters and paging a source supports for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    type_filter: TypeFilter,
    key_filters: BTreeSet<KeyId>,
    range_filters: BTreeSet<KeyId>,
    pagination: bool,
}

impl Default for Caps {
    fn default() -> Self {
        Self::new()
    }
}

impl Caps {
    /// Caps with paging only: no type filter and no key filters.
    pub fn new() -> Self {
        Self {
            type_filter: TypeFilter::empty(),
            key_filters: BTreeSet::new(),
            range_filters: BTreeSet::new(),
            pagination: true,
        }
    }

    #[must_use]
    pub fn with_type_filter(mut self, filter: TypeFilter) -> Self {
        self.type_filter = filter;
        self
    }

    #[must_use]
    pub fn with_key_filters<I: IntoIterator<Item = KeyId>>(mut self, keys: I) -> Self {
        self.key_filters.extend(keys);
        self
    }

    #[must_use]
    pub fn with_range_filters<I: IntoIterator<Item = KeyId>>(mut self, keys: I) -> Self {
        self.range_filters.extend(keys);
        self
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: bool) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn type_filter(&self) -> TypeFilter {
        self.type_filter
    }

    pub fn pagination(&self) -> bool {
        self.pagination
    }

    /// Whether every kind in `filter` can be filtered on.
    pub fn test_type_filter(&self, filter: TypeFilter) -> bool {
        self.type_filter.contains(filter)
    }

    pub fn is_key_filter(&self, key: &KeyId) -> bool {
        self.key_filters.contains(key)
    }

    pub fn is_range_filter(&self, key: &KeyId) -> bool {
        self.range_filters.contains(key)
    }

    pub fn key_filters(&self) -> impl Iterator<Item = &KeyId> {
        self.key_filters.iter()
    }

    pub fn range_filters(&self) -> impl Iterator<Item = &KeyId> {
        self.range_filters.iter()
    }
}
