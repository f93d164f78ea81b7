//! Core type definitions for media kinds, operations, and flag sets.
//!
//! Enums serialize in lowercase, matching how keys and kinds appear in
//! configuration files and provider payloads.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a media record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A browsable container of other records.
    Container,
    /// An audio item.
    Audio,
    /// A video item.
    Video,
    /// An image item.
    Image,
    /// An item whose kind the provider did not state.
    #[default]
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A single operation a source may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Browse,
    Search,
    Query,
    Resolve,
    Store,
    Remove,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 6] = [
        Operation::Browse,
        Operation::Search,
        Operation::Query,
        Operation::Resolve,
        Operation::Store,
        Operation::Remove,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browse => write!(f, "browse"),
            Self::Search => write!(f, "search"),
            Self::Query => write!(f, "query"),
            Self::Resolve => write!(f, "resolve"),
            Self::Store => write!(f, "store"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

bitflags! {
    /// Set of operations a source implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SupportedOps: u32 {
        const BROWSE = 1 << 0;
        const SEARCH = 1 << 1;
        const QUERY = 1 << 2;
        const RESOLVE = 1 << 3;
        const STORE = 1 << 4;
        const REMOVE = 1 << 5;
    }
}

impl From<Operation> for SupportedOps {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Browse => Self::BROWSE,
            Operation::Search => Self::SEARCH,
            Operation::Query => Self::QUERY,
            Operation::Resolve => Self::RESOLVE,
            Operation::Store => Self::STORE,
            Operation::Remove => Self::REMOVE,
        }
    }
}

impl SupportedOps {
    /// Whether `op` is part of this set.
    pub fn supports(self, op: Operation) -> bool {
        self.contains(Self::from(op))
    }
}

bitflags! {
    /// How the broker should resolve and deliver results.
    ///
    /// The empty set is normal resolution with inline delivery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResolutionFlags: u32 {
        /// Fill keys the primary source cannot supply from other sources.
        const FULL = 1 << 0;
        /// Deliver every result from the scheduler instead of the provider's
        /// call stack.
        const IDLE_RELAY = 1 << 1;
        /// Skip keys the source declares as slow to fetch.
        const FAST_ONLY = 1 << 2;
    }
}

bitflags! {
    /// Media kinds an operation should return.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFilter: u32 {
        const AUDIO = 1 << 0;
        const VIDEO = 1 << 1;
        const IMAGE = 1 << 2;
        const ALL = Self::AUDIO.bits() | Self::VIDEO.bits() | Self::IMAGE.bits();
    }
}

impl Default for TypeFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl TypeFilter {
    /// Whether a record of `kind` passes this filter.
    ///
    /// Containers and unknown kinds always pass so browsing stays navigable.
    pub fn matches(self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.contains(Self::AUDIO),
            MediaKind::Video => self.contains(Self::VIDEO),
            MediaKind::Image => self.contains(Self::IMAGE),
            MediaKind::Container | MediaKind::Other => true,
        }
    }
}
