//! The operation broker.
//!
//! [`Broker`] turns one caller request into provider calls. It validates the
//! request against the source's declared capabilities, plans full-resolution
//! augmentation and auto-splitting, allocates an operation id and posts the
//! first provider call to its [`Scheduler`]. Results travel back through a
//! chain of stages (relay, optional composer, delivery) to the caller's
//! callback.
//!
//! Nothing runs until the scheduler is drained, either by the owner
//! ([`Broker::run_pending`], [`Scheduler::block_until`]) or by one of the
//! `*_sync` / `*_collect` conveniences.

mod composer;
pub mod ledger;
mod multiple;
pub(crate) mod pipeline;
mod plan;
mod relay;
pub mod scheduler;
mod split;
mod sync;

pub use ledger::{CancelHook, OperationInfo, OperationLedger, OperationPhase};
pub use pipeline::{ResultCallback, ResultItem};
pub use scheduler::Scheduler;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use mediaweave_common::{
    BrokerError, ErrorCode, KeyId, Media, Operation, OperationId, ProviderError, ResolutionFlags,
    Result,
};

use crate::config::Config;
use crate::options::OperationOptions;
use crate::source::{
    Completion, RemoveSpec, ResolveSpec, Source, SourceRegistry, StoreSpec,
};
use composer::{augment, Composer};
use pipeline::{Stage, UserDelivery};
use plan::{filter_slow_keys, plan_full_resolution, KeyAssignment, ResolutionPlan};
use relay::{Relay, StreamRequest};
use split::AutoSplit;

/// State shared by a broker and every stage of its operations.
pub(crate) struct BrokerContext {
    pub ledger: OperationLedger,
    pub scheduler: Scheduler,
    pub registry: SourceRegistry,
    pub config: Config,
    split_thresholds: RwLock<HashMap<String, u32>>,
}

impl BrokerContext {
    pub fn new(config: Config) -> Arc<Self> {
        let registry = SourceRegistry::new();
        for (source_id, source) in &config.sources {
            if let Some(rank) = source.rank {
                registry.set_rank(source_id, rank);
            }
        }

        Arc::new(Self {
            ledger: OperationLedger::new(),
            scheduler: Scheduler::new(),
            registry,
            config,
            split_thresholds: RwLock::new(HashMap::new()),
        })
    }

    /// Auto-split threshold for `source`: configuration first, then a
    /// runtime override, then what the source declares.
    pub fn split_threshold(&self, source: &dyn Source) -> u32 {
        if let Some(threshold) = self
            .config
            .source(source.id())
            .and_then(|s| s.auto_split_threshold)
        {
            return threshold;
        }
        if let Some(threshold) = self.split_thresholds.read().get(source.id()) {
            return *threshold;
        }
        source.auto_split_threshold()
    }

    /// Ledger entry for a call to `source`, cancelling through its hook.
    fn begin(&self, source: &Arc<dyn Source>) -> OperationId {
        let hook_source = Arc::clone(source);
        let hook: CancelHook = Arc::new(move |id| hook_source.cancel(id));
        self.ledger.begin(source.id(), Some(hook))
    }
}

/// Caller side of a single-answer operation.
struct SingleShot<T> {
    ctx: Arc<BrokerContext>,
    operation_id: OperationId,
    callback: Box<dyn FnOnce(OperationId, Result<T>) + Send>,
}

impl<T> SingleShot<T> {
    /// Close the operation and answer the caller. Cancellation wins over
    /// whatever the source answered.
    fn finish(self, result: Result<T>) {
        let result = if self.ctx.ledger.is_cancelled(self.operation_id) {
            if let Err(error) = &result {
                tracing::debug!(
                    operation_id = %self.operation_id,
                    %error,
                    "Source error superseded by cancellation"
                );
            }
            Err(BrokerError::Cancelled)
        } else {
            result
        };

        self.ctx.ledger.mark_completed(self.operation_id);
        (self.callback)(self.operation_id, result);
        self.ctx.ledger.mark_finished(self.operation_id);
    }
}

/// Entry point for every catalog operation.
///
/// Cloning is cheap; clones share sources, scheduler and ledger.
#[derive(Clone)]
pub struct Broker {
    ctx: Arc<BrokerContext>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("sources", &self.ctx.registry.len())
            .field("operations", &self.ctx.ledger.len())
            .finish()
    }
}

impl Broker {
    pub fn new(config: Config) -> Self {
        Self {
            ctx: BrokerContext::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.ctx.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.ctx.scheduler
    }

    pub fn ledger(&self) -> &OperationLedger {
        &self.ctx.ledger
    }

    /// Run every queued task. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        self.ctx.scheduler.run_pending()
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Add a source. Sources disabled in the configuration are refused.
    pub fn register_source(&self, source: Arc<dyn Source>) -> Result<()> {
        if !self.ctx.config.source_enabled(source.id()) {
            return Err(BrokerError::validation(format!(
                "source '{}' is disabled in the configuration",
                source.id()
            )));
        }
        let source_id = source.id().to_string();
        self.ctx.registry.register(source)?;
        tracing::info!(source = %source_id, "Source registered");
        Ok(())
    }

    pub fn unregister_source(&self, source_id: &str) -> Option<Arc<dyn Source>> {
        let removed = self.ctx.registry.unregister(source_id);
        if removed.is_some() {
            self.ctx.split_thresholds.write().remove(source_id);
            tracing::info!(source = %source_id, "Source unregistered");
        }
        removed
    }

    /// Override the auto-split threshold of a registered source. 0 disables
    /// splitting. A threshold set in the configuration still takes
    /// precedence.
    pub fn set_auto_split_threshold(&self, source_id: &str, threshold: u32) -> Result<()> {
        if self.ctx.registry.get(source_id).is_none() {
            return Err(BrokerError::validation(format!(
                "unknown source '{source_id}'"
            )));
        }
        self.ctx
            .split_thresholds
            .write()
            .insert(source_id.to_string(), threshold);
        Ok(())
    }

    /// Effective auto-split threshold of a registered source.
    pub fn auto_split_threshold(&self, source_id: &str) -> Option<u32> {
        self.ctx
            .registry
            .get(source_id)
            .map(|source| self.ctx.split_threshold(source.as_ref()))
    }

    // ------------------------------------------------------------------
    // Operation lifecycle
    // ------------------------------------------------------------------

    /// Request cancellation of `operation_id`.
    ///
    /// The operation still ends with a terminator, carrying
    /// [`BrokerError::Cancelled`]. Returns `false` when there was nothing to
    /// cancel.
    pub fn cancel(&self, operation_id: OperationId) -> bool {
        let cancelled = self.ctx.ledger.cancel(operation_id);
        if cancelled {
            tracing::debug!(%operation_id, "Cancel requested");
        } else {
            tracing::debug!(%operation_id, "Nothing to cancel");
        }
        cancelled
    }

    pub fn operations(&self) -> Vec<OperationInfo> {
        self.ctx.ledger.snapshot()
    }

    pub fn operation_phase(&self, operation_id: OperationId) -> OperationPhase {
        self.ctx.ledger.phase(operation_id)
    }

    /// Attach a payload to a live operation, replacing any previous one.
    pub fn set_operation_data<T: Any + Send>(&self, operation_id: OperationId, data: T) -> bool {
        self.ctx.ledger.attach(operation_id, Box::new(data))
    }

    pub fn operation_data<T: Any + Clone>(&self, operation_id: OperationId) -> Option<T> {
        self.ctx.ledger.with_data(operation_id, |data: &T| data.clone())
    }

    pub fn take_operation_data<T: Any>(&self, operation_id: OperationId) -> Option<T> {
        let data = self.ctx.ledger.detach(operation_id)?;
        data.downcast::<T>().ok().map(|data| *data)
    }

    // ------------------------------------------------------------------
    // Result streams
    // ------------------------------------------------------------------

    /// List the children of `container` (the source's root when `None`).
    pub fn browse<F>(
        &self,
        source_id: &str,
        container: Option<&Media>,
        keys: &[KeyId],
        options: OperationOptions,
        callback: F,
    ) -> Result<OperationId>
    where
        F: Fn(ResultItem) + Send + Sync + 'static,
    {
        let container = container.cloned().unwrap_or_else(Media::container);
        self.start_stream(
            source_id,
            StreamRequest::Browse { container },
            keys,
            options,
            Arc::new(callback),
        )
    }

    /// Free-text search. `None` asks the source for everything it has.
    pub fn search<F>(
        &self,
        source_id: &str,
        text: Option<&str>,
        keys: &[KeyId],
        options: OperationOptions,
        callback: F,
    ) -> Result<OperationId>
    where
        F: Fn(ResultItem) + Send + Sync + 'static,
    {
        self.start_stream(
            source_id,
            StreamRequest::Search {
                text: text.map(str::to_string),
            },
            keys,
            options,
            Arc::new(callback),
        )
    }

    /// Run `query`, written in the source's own query language.
    pub fn query<F>(
        &self,
        source_id: &str,
        query: &str,
        keys: &[KeyId],
        options: OperationOptions,
        callback: F,
    ) -> Result<OperationId>
    where
        F: Fn(ResultItem) + Send + Sync + 'static,
    {
        self.start_stream(
            source_id,
            StreamRequest::Query {
                query: query.to_string(),
            },
            keys,
            options,
            Arc::new(callback),
        )
    }

    fn start_stream(
        &self,
        source_id: &str,
        request: StreamRequest,
        keys: &[KeyId],
        options: OperationOptions,
        callback: ResultCallback,
    ) -> Result<OperationId> {
        let operation = request.operation();
        let source = self.lookup(source_id, operation)?;
        if options.count() == Some(0) {
            return Err(BrokerError::validation("count must be at least 1"));
        }
        let mut options = self.check_caps(source.as_ref(), operation, &options)?;

        let flags = options.resolution_flags() | self.ctx.config.broker.default_flags();
        options.set_resolution_flags(flags);
        let plan = self.plan_keys(source.as_ref(), keys, flags);

        let split = options.count().and_then(|count| {
            AutoSplit::new(options.skip(), count, self.ctx.split_threshold(source.as_ref()))
        });

        let operation_id = self.ctx.begin(&source);
        tracing::debug!(
            %operation_id,
            source = %source.id(),
            %operation,
            skip = options.skip(),
            count = ?options.count(),
            full = !plan.assignments.is_empty(),
            auto_split = split.is_some(),
            "Dispatching"
        );

        let delivery: Arc<dyn Stage> = Arc::new(UserDelivery::new(
            Arc::clone(&self.ctx),
            operation_id,
            callback,
        ));
        let next: Arc<dyn Stage> = if plan.assignments.is_empty() {
            delivery
        } else {
            Composer::new(
                Arc::clone(&self.ctx),
                operation_id,
                plan.assignments,
                delivery,
            )
        };

        let relay = Relay::new(
            Arc::clone(&self.ctx),
            operation_id,
            source,
            request,
            plan.keys,
            options,
            split,
            flags.contains(ResolutionFlags::IDLE_RELAY),
            next,
        );
        relay.start();

        Ok(operation_id)
    }

    // ------------------------------------------------------------------
    // Single-answer operations
    // ------------------------------------------------------------------

    /// Fill `keys` on `media`.
    ///
    /// With [`ResolutionFlags::FULL`], keys the source cannot supply are
    /// requested from other sources and merged into its answer.
    pub fn resolve<F>(
        &self,
        source_id: &str,
        media: &Media,
        keys: &[KeyId],
        options: OperationOptions,
        callback: F,
    ) -> Result<OperationId>
    where
        F: FnOnce(OperationId, Result<Media>) + Send + 'static,
    {
        let source = self.lookup(source_id, Operation::Resolve)?;
        let options = self.check_caps(source.as_ref(), Operation::Resolve, &options)?;
        let plan = self.plan_keys(source.as_ref(), keys, options.resolution_flags());
        let assignments: Arc<[KeyAssignment]> = plan.assignments.into();
        let keys = plan.keys;
        let request = media.clone();
        let source_id = source.id().to_string();

        let operation_id = self.dispatch_single(
            source,
            ErrorCode::ResolveFailed,
            callback,
            move |source, operation_id, completion| match source.resolver() {
                Some(resolver) => resolver.resolve(ResolveSpec {
                    operation_id,
                    media: request,
                    keys,
                    options,
                    completion,
                }),
                None => completion.fail(missing_slot(source, Operation::Resolve)),
            },
            move |mut media: Media, shot: SingleShot<Media>| {
                if media.source().is_none() {
                    media.set_source(source_id);
                }
                if assignments.is_empty() || shot.ctx.ledger.is_cancelled(shot.operation_id) {
                    shot.finish(Ok(media));
                    return;
                }
                let ctx = Arc::clone(&shot.ctx);
                augment(&ctx, shot.operation_id, media, &assignments, move |media| {
                    shot.finish(Ok(media))
                });
            },
        );
        Ok(operation_id)
    }

    /// Store `media` under `parent` (the root when `None`). The callback
    /// receives the stored record as the source returned it.
    pub fn store<F>(
        &self,
        source_id: &str,
        parent: Option<&Media>,
        media: Media,
        callback: F,
    ) -> Result<OperationId>
    where
        F: FnOnce(OperationId, Result<Media>) + Send + 'static,
    {
        let source = self.lookup(source_id, Operation::Store)?;
        if let Some(parent) = parent {
            if !parent.is_container() {
                return Err(BrokerError::validation("store parent must be a container"));
            }
        }
        let parent = parent.cloned();
        let source_id = source.id().to_string();

        let operation_id = self.dispatch_single(
            source,
            ErrorCode::StoreFailed,
            callback,
            move |source, operation_id, completion| match source.storer() {
                Some(storer) => storer.store(StoreSpec {
                    operation_id,
                    parent,
                    media,
                    completion,
                }),
                None => completion.fail(missing_slot(source, Operation::Store)),
            },
            move |mut media: Media, shot: SingleShot<Media>| {
                if media.source().is_none() {
                    media.set_source(source_id);
                }
                shot.finish(Ok(media));
            },
        );
        Ok(operation_id)
    }

    /// Delete `media`, which must carry an id, from the source.
    pub fn remove<F>(&self, source_id: &str, media: &Media, callback: F) -> Result<OperationId>
    where
        F: FnOnce(OperationId, Result<()>) + Send + 'static,
    {
        let source = self.lookup(source_id, Operation::Remove)?;
        if media.id().is_none() {
            return Err(BrokerError::validation("cannot remove a record without an id"));
        }
        let media = media.clone();

        let operation_id = self.dispatch_single(
            source,
            ErrorCode::RemoveFailed,
            callback,
            move |source, operation_id, completion| match source.remover() {
                Some(remover) => remover.remove(RemoveSpec {
                    operation_id,
                    media,
                    completion,
                }),
                None => completion.fail(missing_slot(source, Operation::Remove)),
            },
            |(), shot: SingleShot<()>| shot.finish(Ok(())),
        );
        Ok(operation_id)
    }

    /// Allocate an id and post `call` to the scheduler. `accept` receives a
    /// successful answer; failures and cancellation close the operation
    /// directly.
    fn dispatch_single<T, C, F, A>(
        &self,
        source: Arc<dyn Source>,
        code: ErrorCode,
        callback: C,
        call: F,
        accept: A,
    ) -> OperationId
    where
        T: Send + 'static,
        C: FnOnce(OperationId, Result<T>) + Send + 'static,
        F: FnOnce(&dyn Source, OperationId, Completion<T>) + Send + 'static,
        A: FnOnce(T, SingleShot<T>) + Send + 'static,
    {
        let operation_id = self.ctx.begin(&source);
        let shot = SingleShot {
            ctx: Arc::clone(&self.ctx),
            operation_id,
            callback: Box::new(callback),
        };
        let ctx = Arc::clone(&self.ctx);

        self.ctx.scheduler.post(move || {
            if ctx.ledger.is_cancelled(operation_id) {
                tracing::debug!(
                    %operation_id,
                    "Operation cancelled before the source was called"
                );
                shot.finish(Err(BrokerError::Cancelled));
                return;
            }

            tracing::debug!(%operation_id, source = %source.id(), "Calling source");
            let completion = Completion::new(operation_id, code, move |result| match result {
                Ok(value) => accept(value, shot),
                Err(error) => shot.finish(Err(error.into())),
            });
            call(source.as_ref(), operation_id, completion);
        });

        operation_id
    }

    // ------------------------------------------------------------------
    // Validation and planning
    // ------------------------------------------------------------------

    fn lookup(&self, source_id: &str, operation: Operation) -> Result<Arc<dyn Source>> {
        let source = self
            .ctx
            .registry
            .get(source_id)
            .ok_or_else(|| BrokerError::validation(format!("unknown source '{source_id}'")))?;

        if !source.supported_operations().supports(operation) {
            return Err(BrokerError::validation(format!(
                "source '{source_id}' does not support {operation}"
            )));
        }
        Ok(source)
    }

    /// Bind `options` to the source's caps, failing on any filter the source
    /// does not declare.
    fn check_caps(
        &self,
        source: &dyn Source,
        operation: Operation,
        options: &OperationOptions,
    ) -> Result<OperationOptions> {
        let caps = self
            .ctx
            .registry
            .capabilities_of(source.id(), operation)
            .unwrap_or_else(|| source.caps(operation));
        let check = options.obey_caps(&caps);
        if !check.all_supported {
            return Err(BrokerError::capability_mismatch(
                source.id(),
                check.unsupported.filter_names(),
            ));
        }
        Ok(check.supported)
    }

    fn plan_keys(&self, source: &dyn Source, keys: &[KeyId], flags: ResolutionFlags) -> ResolutionPlan {
        let fast_only = flags.contains(ResolutionFlags::FAST_ONLY);
        let keys = if fast_only {
            filter_slow_keys(source, keys)
        } else {
            keys.to_vec()
        };

        if flags.contains(ResolutionFlags::FULL) {
            plan_full_resolution(&self.ctx.registry, source, &keys, fast_only)
        } else {
            ResolutionPlan {
                keys,
                assignments: Vec::new(),
            }
        }
    }
}

fn missing_slot(source: &dyn Source, operation: Operation) -> ProviderError {
    let code = match operation {
        Operation::Store => ErrorCode::StoreFailed,
        Operation::Remove => ErrorCode::RemoveFailed,
        _ => ErrorCode::ResolveFailed,
    };
    ProviderError::new(
        code,
        format!("source '{}' no longer implements {operation}", source.id()),
    )
}
