//! Relay stage: the first stage a source's results enter.
//!
//! The relay owns the request it was built for. It invokes the source from
//! the scheduler, filters results of cancelled or finished operations, turns
//! chunk-local counts into request-wide ones while auto-splitting, tags items
//! with the source id, and optionally defers delivery to the next scheduler
//! tick.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use mediaweave_common::{BrokerError, ErrorCode, KeyId, Media, Operation, OperationId};

use super::pipeline::{Emission, Stage};
use super::split::AutoSplit;
use super::BrokerContext;
use crate::options::OperationOptions;
use crate::source::{BrowseSpec, QuerySpec, ResultSink, SearchSpec, Source};

/// Which result-stream operation a relay drives.
#[derive(Debug, Clone)]
pub(crate) enum StreamRequest {
    Browse { container: Media },
    Search { text: Option<String> },
    Query { query: String },
}

impl StreamRequest {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Browse { .. } => Operation::Browse,
            Self::Search { .. } => Operation::Search,
            Self::Query { .. } => Operation::Query,
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Browse { .. } => ErrorCode::BrowseFailed,
            Self::Search { .. } => ErrorCode::SearchFailed,
            Self::Query { .. } => ErrorCode::QueryFailed,
        }
    }

    /// Hand the request to the matching slot of `source`.
    ///
    /// Returns `false` when the slot is empty.
    fn invoke(
        &self,
        source: &dyn Source,
        operation_id: OperationId,
        keys: Vec<KeyId>,
        options: OperationOptions,
        sink: ResultSink,
    ) -> bool {
        match self {
            Self::Browse { container } => match source.browser() {
                Some(browser) => {
                    browser.browse(BrowseSpec {
                        operation_id,
                        container: container.clone(),
                        keys,
                        options,
                        sink,
                    });
                    true
                }
                None => false,
            },
            Self::Search { text } => match source.searcher() {
                Some(searcher) => {
                    searcher.search(SearchSpec {
                        operation_id,
                        text: text.clone(),
                        keys,
                        options,
                        sink,
                    });
                    true
                }
                None => false,
            },
            Self::Query { query } => match source.querier() {
                Some(querier) => {
                    querier.query(QuerySpec {
                        operation_id,
                        query: query.clone(),
                        keys,
                        options,
                        sink,
                    });
                    true
                }
                None => false,
            },
        }
    }
}

/// Per-call state, dropped when the terminator passes.
struct CallState {
    request: StreamRequest,
    keys: Vec<KeyId>,
    options: OperationOptions,
    split: Option<AutoSplit>,
}

impl CallState {
    fn chunk_options(&self) -> OperationOptions {
        let mut options = self.options.clone();
        if let Some(split) = &self.split {
            let chunk = split.current_chunk();
            options.set_skip(chunk.skip);
            options.set_count(chunk.count);
        }
        options
    }
}

pub(crate) struct Relay {
    me: Weak<Relay>,
    ctx: Arc<BrokerContext>,
    operation_id: OperationId,
    source: Arc<dyn Source>,
    idle: bool,
    next: Arc<dyn Stage>,
    call: Mutex<Option<CallState>>,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<BrokerContext>,
        operation_id: OperationId,
        source: Arc<dyn Source>,
        request: StreamRequest,
        keys: Vec<KeyId>,
        options: OperationOptions,
        split: Option<AutoSplit>,
        idle: bool,
        next: Arc<dyn Stage>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Relay {
            me: me.clone(),
            ctx,
            operation_id,
            source,
            idle,
            next,
            call: Mutex::new(Some(CallState {
                request,
                keys,
                options,
                split,
            })),
        })
    }

    /// Post the first source call.
    pub fn start(&self) {
        self.schedule_call();
    }

    fn schedule_call(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        self.ctx.scheduler.post(move || me.invoke());
    }

    fn invoke(self: Arc<Self>) {
        if self.ctx.ledger.is_cancelled(self.operation_id) {
            tracing::debug!(
                operation_id = %self.operation_id,
                "Operation cancelled before the source was called"
            );
            self.push(Emission::terminator(None));
            return;
        }

        let call = {
            let call = self.call.lock();
            call.as_ref()
                .map(|c| (c.request.clone(), c.keys.clone(), c.chunk_options()))
        };
        let Some((request, keys, options)) = call else {
            return;
        };

        tracing::debug!(
            operation_id = %self.operation_id,
            source = %self.source.id(),
            operation = %request.operation(),
            skip = options.skip(),
            count = ?options.count(),
            "Calling source"
        );

        let sink = ResultSink::new(self.operation_id, Arc::clone(&self) as Arc<dyn Stage>);
        if !request.invoke(self.source.as_ref(), self.operation_id, keys, options, sink) {
            let error = BrokerError::provider(
                request.error_code(),
                format!("source '{}' no longer implements {}", self.source.id(), request.operation()),
            );
            self.push(Emission::terminator(Some(error)));
        }
    }

    fn release(&self) {
        self.call.lock().take();
    }

    fn forward(&self, item: Emission) {
        if !self.idle {
            self.next.push(item);
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let next = Arc::clone(&self.next);
        let operation_id = self.operation_id;
        self.ctx.scheduler.post(move || {
            if !item.is_last() && ctx.ledger.is_cancelled(operation_id) {
                tracing::debug!(%operation_id, "Dropping deferred result of cancelled operation");
                return;
            }
            next.push(item);
        });
    }

    /// Terminate an operation that was cancelled before its terminator.
    fn close_cancelled(&self, mut item: Emission) {
        if let Some(error) = item.error.take() {
            tracing::debug!(
                operation_id = %self.operation_id,
                source = %self.source.id(),
                %error,
                "Source error superseded by cancellation"
            );
        }
        if item.media.is_some() {
            tracing::debug!(operation_id = %self.operation_id, "Dropping final item of cancelled operation");
        }
        self.ctx.ledger.mark_completed(self.operation_id);
        self.release();
        self.forward(Emission::terminator(Some(BrokerError::Cancelled)));
    }
}

impl Stage for Relay {
    fn push(&self, mut item: Emission) {
        let ledger = &self.ctx.ledger;

        if item.error.is_some() && item.remaining != 0 {
            tracing::warn!(
                operation_id = %self.operation_id,
                source = %self.source.id(),
                remaining = item.remaining,
                "Source reported an error before its last result, ending the operation"
            );
            item.remaining = 0;
        }
        let provider_remaining = item.remaining;

        if !ledger.is_ongoing(self.operation_id) {
            if provider_remaining > 0 {
                tracing::trace!(operation_id = %self.operation_id, "Skipping result of inactive operation");
                return;
            }
            if ledger.is_completed(self.operation_id) {
                tracing::warn!(
                    operation_id = %self.operation_id,
                    source = %self.source.id(),
                    "Source emitted remaining=0 more than once"
                );
                return;
            }
            self.close_cancelled(item);
            return;
        }

        let next_chunk = {
            let mut call = self.call.lock();
            match call.as_mut().and_then(|c| c.split.as_mut()) {
                Some(split) => {
                    item.remaining = split.translate(provider_remaining);
                    if item.error.is_some() {
                        item.remaining = 0;
                        None
                    } else {
                        split.next_chunk(provider_remaining)
                    }
                }
                None => None,
            }
        };

        if let Some(media) = item.media.as_mut() {
            media.set_source(self.source.id());
        }

        let last = item.is_last();
        if last {
            ledger.mark_completed(self.operation_id);
        }

        if item.media.is_none() && !last {
            tracing::debug!(operation_id = %self.operation_id, "Chunk ended without a final item");
        } else {
            self.forward(item);
        }

        if let Some(chunk) = next_chunk {
            tracing::debug!(
                operation_id = %self.operation_id,
                skip = chunk.skip,
                count = chunk.count,
                "auto-split: requesting next chunk"
            );
            self.schedule_call();
        }

        if last {
            tracing::debug!(
                operation_id = %self.operation_id,
                source = %self.source.id(),
                "Got remaining 0"
            );
            self.release();
        }
    }
}
