//! Trait definition and request types for media sources.
//!
//! A [`Source`] is one provider plugin. It declares the metadata keys it can
//! supply and exposes each operation it implements through an optional slot:
//! a source that can browse returns `Some` from [`Source::browser`], and so
//! on. The set of supported operations is derived from which slots are
//! filled.
//!
//! Operations are fire-and-forget. The broker hands the source a request
//! carrying a [`ResultSink`] or [`Completion`], and the source answers through
//! it whenever it is ready, from any thread.

pub mod registry;
mod sink;

pub use registry::SourceRegistry;
pub use sink::{Completion, ResultSink};

use std::sync::Arc;

use mediaweave_common::{KeyId, Media, Operation, OperationId, SupportedOps};

use crate::options::{Caps, OperationOptions};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to list the children of a container.
pub struct BrowseSpec {
    pub operation_id: OperationId,
    /// Container to browse; a record without an id is the source's root.
    pub container: Media,
    pub keys: Vec<KeyId>,
    /// Paging and filters. Read skip and count from here.
    pub options: OperationOptions,
    pub sink: ResultSink,
}

/// Request for a free-text search.
pub struct SearchSpec {
    pub operation_id: OperationId,
    /// Search terms; `None` asks for everything the source has.
    pub text: Option<String>,
    pub keys: Vec<KeyId>,
    pub options: OperationOptions,
    pub sink: ResultSink,
}

/// Request for a query in the source's own query language.
pub struct QuerySpec {
    pub operation_id: OperationId,
    pub query: String,
    pub keys: Vec<KeyId>,
    pub options: OperationOptions,
    pub sink: ResultSink,
}

/// Request to fill `keys` on a single record.
pub struct ResolveSpec {
    pub operation_id: OperationId,
    pub media: Media,
    pub keys: Vec<KeyId>,
    pub options: OperationOptions,
    /// Answer with the resolved record.
    pub completion: Completion<Media>,
}

/// Request to add a record to the source.
pub struct StoreSpec {
    pub operation_id: OperationId,
    /// Container to store into; `None` for the root.
    pub parent: Option<Media>,
    pub media: Media,
    /// Answer with the stored record, carrying the id the source assigned.
    pub completion: Completion<Media>,
}

/// Request to delete a record from the source.
pub struct RemoveSpec {
    pub operation_id: OperationId,
    pub media: Media,
    pub completion: Completion<()>,
}

// ---------------------------------------------------------------------------
// Operation slots
// ---------------------------------------------------------------------------

pub trait Browser: Send + Sync {
    fn browse(&self, spec: BrowseSpec);
}

pub trait Searcher: Send + Sync {
    fn search(&self, spec: SearchSpec);
}

pub trait Querier: Send + Sync {
    fn query(&self, spec: QuerySpec);
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, spec: ResolveSpec);
}

pub trait Storer: Send + Sync {
    fn store(&self, spec: StoreSpec);
}

pub trait Remover: Send + Sync {
    fn remove(&self, spec: RemoveSpec);
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A media provider.
///
/// Only [`Source::id`] and [`Source::supported_keys`] are required. Every
/// operation slot defaults to `None`.
pub trait Source: Send + Sync {
    /// Unique identifier, e.g. `"jamendo"`.
    fn id(&self) -> &str;

    /// Human readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Ordering among sources; higher ranks are consulted first.
    fn rank(&self) -> i32 {
        0
    }

    /// Keys this source can supply.
    fn supported_keys(&self) -> Vec<KeyId>;

    /// Supported keys that are expensive to fetch.
    fn slow_keys(&self) -> Vec<KeyId> {
        Vec::new()
    }

    /// Keys that can be written through [`Storer`].
    fn writable_keys(&self) -> Vec<KeyId> {
        Vec::new()
    }

    /// Keys a record must already carry before this source can resolve `key`.
    ///
    /// `None` means the source cannot resolve `key` at all. The default treats
    /// every supported key as resolvable with no prerequisites.
    fn key_dependencies(&self, key: &KeyId) -> Option<Vec<KeyId>> {
        if self.supported_keys().contains(key) {
            Some(Vec::new())
        } else {
            None
        }
    }

    /// Filters and paging honoured for `operation`.
    fn caps(&self, _operation: Operation) -> Arc<Caps> {
        Arc::new(Caps::default())
    }

    /// Page size above which the broker splits requests; 0 disables splitting.
    fn auto_split_threshold(&self) -> u32 {
        0
    }

    fn browser(&self) -> Option<&dyn Browser> {
        None
    }

    fn searcher(&self) -> Option<&dyn Searcher> {
        None
    }

    fn querier(&self) -> Option<&dyn Querier> {
        None
    }

    fn resolver(&self) -> Option<&dyn Resolver> {
        None
    }

    fn storer(&self) -> Option<&dyn Storer> {
        None
    }

    fn remover(&self) -> Option<&dyn Remover> {
        None
    }

    /// Stop work for `operation_id` if possible. The broker still expects the
    /// terminating result.
    fn cancel(&self, _operation_id: OperationId) {}

    /// Operations this source implements, derived from its filled slots.
    fn supported_operations(&self) -> SupportedOps {
        let mut ops = SupportedOps::empty();
        ops.set(SupportedOps::BROWSE, self.browser().is_some());
        ops.set(SupportedOps::SEARCH, self.searcher().is_some());
        ops.set(SupportedOps::QUERY, self.querier().is_some());
        ops.set(SupportedOps::RESOLVE, self.resolver().is_some());
        ops.set(SupportedOps::STORE, self.storer().is_some());
        ops.set(SupportedOps::REMOVE, self.remover().is_some());
        ops
    }

    /// Whether `key` is declared in [`Source::supported_keys`].
    fn supports_key(&self, key: &KeyId) -> bool {
        self.supported_keys().contains(key)
    }
}
