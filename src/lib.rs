//! Mediaweave - Operation broker for media catalogs
//!
//! Browse, search and query independent provider plugins ([`Source`]s)
//! through one asynchronous API. The [`Broker`] validates each request
//! against the source's capabilities, tracks the operation until its last
//! result, splits oversized requests into pages, and can fill keys the
//! primary source lacks from other sources while keeping result order.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mediaweave::{keys, Broker, OperationOptions};
//!
//! let broker = Broker::default();
//! broker.register_source(Arc::new(my_source))?;
//!
//! let tracks = broker.browse_sync(
//!     "jamendo",
//!     None,
//!     &[keys::TITLE, keys::URL],
//!     OperationOptions::default().with_count(20),
//! )?;
//! ```

pub mod broker;
pub mod config;
pub mod options;
pub mod source;
pub mod telemetry;

pub use broker::{
    Broker, OperationInfo, OperationLedger, OperationPhase, ResultCallback, ResultItem, Scheduler,
};
pub use config::Config;
pub use options::{Caps, CapsCheck, OperationOptions, RangeFilter};
pub use source::{
    BrowseSpec, Browser, Completion, Querier, QuerySpec, RemoveSpec, Remover, ResolveSpec,
    Resolver, ResultSink, SearchSpec, Searcher, Source, SourceRegistry, StoreSpec, Storer,
};

pub use mediaweave_common::{
    keys, BrokerError, ErrorCode, KeyId, Media, MediaKind, Operation, OperationId, ProviderError,
    ResolutionFlags, Result, SupportedOps, TypeFilter,
};
