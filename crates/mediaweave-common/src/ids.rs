//! Operation identifiers.
//!
//! Every browse, search, query, resolve, store, or remove call is tracked under
//! an [`OperationId`] handed out by the broker's operation ledger. Ids grow
//! monotonically and are never reused by the ledger that issued them.

use serde::{Deserialize, Serialize};

/// Identifier of a broker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for OperationId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<OperationId> for u64 {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
