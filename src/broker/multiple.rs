//! Search across every searchable source as one result stream.
//!
//! The requested count is split across the sources, the first source taking
//! the remainder. When a round ends short of the count, the sources that
//! delivered everything they were asked for are asked again for the
//! shortfall, continuing where they stopped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use mediaweave_common::{
    BrokerError, ErrorCode, KeyId, Operation, OperationId, ResolutionFlags, Result,
};

use super::pipeline::{Emission, ResultItem, Stage, UserDelivery};
use super::{Broker, CancelHook};
use crate::options::OperationOptions;
use crate::source::Source;

/// Ledger source id of multiple-search operations.
const MULTIPLE_SOURCE_ID: &str = "multiple";

struct SubSearch {
    round: u32,
    requested: u32,
    received: u32,
    operation_id: Option<OperationId>,
    done: bool,
}

struct SearchState {
    /// Items still owed to the caller.
    remaining: u32,
    round: u32,
    pending: usize,
    subs: HashMap<String, SubSearch>,
    /// Next skip per source.
    offsets: HashMap<String, u32>,
    /// Sources that delivered everything asked of them this round.
    more: Vec<Arc<dyn Source>>,
    cancelled: bool,
    finished: bool,
    outgoing: VecDeque<Emission>,
    delivering: bool,
}

struct MultipleSearch {
    broker: Broker,
    text: Option<String>,
    keys: Vec<KeyId>,
    flags: ResolutionFlags,
    delivery: OnceLock<UserDelivery>,
    operation_id: OnceLock<OperationId>,
    state: Mutex<SearchState>,
}

impl MultipleSearch {
    fn id(&self) -> OperationId {
        self.operation_id
            .get()
            .copied()
            .unwrap_or(OperationId::new(0))
    }

    /// Start one sub-search per source, splitting `count` between them.
    fn start_round(self: &Arc<Self>, sources: Vec<Arc<dyn Source>>, count: u32) {
        let n = sources.len() as u32;
        if n == 0 {
            self.close_if_idle();
            return;
        }
        let individual = count / n;
        let first = individual + count % n;

        let round = {
            let mut state = self.state.lock();
            state.round += 1;
            state.more.clear();
            state.round
        };
        tracing::debug!(
            operation_id = %self.id(),
            round,
            sources = n,
            count,
            "Multiple search round"
        );

        for (index, source) in sources.into_iter().enumerate() {
            let requested = if index == 0 { first } else { individual };
            if requested == 0 {
                continue;
            }
            let source_id = source.id().to_string();

            let skip = {
                let mut state = self.state.lock();
                state.pending += 1;
                state.subs.insert(
                    source_id.clone(),
                    SubSearch {
                        round,
                        requested,
                        received: 0,
                        operation_id: None,
                        done: false,
                    },
                );
                state.offsets.get(&source_id).copied().unwrap_or(0)
            };

            let options = OperationOptions::default()
                .with_skip(skip)
                .with_count(requested)
                .with_flags(self.flags);
            let me = Arc::clone(self);
            let sub_source = source_id.clone();
            let result = self.broker.search(
                &source_id,
                self.text.as_deref(),
                &self.keys,
                options,
                move |item| me.on_result(&sub_source, round, item),
            );

            let cancel_now = {
                let mut state = self.state.lock();
                match result {
                    Ok(sub_id) => {
                        if let Some(sub) = state.subs.get_mut(&source_id) {
                            sub.operation_id = Some(sub_id);
                        }
                        state.offsets.insert(source_id.clone(), skip + requested);
                        state.cancelled.then_some(sub_id)
                    }
                    Err(error) => {
                        tracing::warn!(
                            operation_id = %self.id(),
                            source = %source_id,
                            %error,
                            "Source refused its part of a multiple search"
                        );
                        state.subs.remove(&source_id);
                        state.pending -= 1;
                        None
                    }
                }
            };
            if let Some(sub_id) = cancel_now {
                self.broker.ctx.ledger.cancel(sub_id);
            }
        }

        self.close_if_idle();
    }

    /// End the stream when no sub-search is left running.
    fn close_if_idle(&self) {
        {
            let mut state = self.state.lock();
            if state.pending > 0 || state.finished {
                return;
            }
            let error = state.cancelled.then_some(BrokerError::Cancelled);
            state.finished = true;
            state.outgoing.push_back(Emission::terminator(error));
        }
        self.broker.ctx.ledger.mark_completed(self.id());
        self.drain();
    }

    fn on_result(self: &Arc<Self>, source_id: &str, round: u32, item: ResultItem) {
        let terminator = item.is_terminator();
        let mut next_round = None;

        {
            let mut state = self.state.lock();
            let current = matches!(state.subs.get(source_id), Some(sub) if sub.round == round && !sub.done);
            if state.finished || !current {
                tracing::trace!(
                    operation_id = %self.id(),
                    source = %source_id,
                    "Skipping result of finished sub-search"
                );
                return;
            }

            if let Some(media) = item.media {
                if state.cancelled {
                    tracing::trace!(operation_id = %self.id(), "Dropping result of cancelled search");
                } else if state.remaining == 0 {
                    tracing::warn!(
                        operation_id = %self.id(),
                        source = %source_id,
                        "Source delivered more results than requested"
                    );
                } else {
                    state.remaining -= 1;
                    if let Some(sub) = state.subs.get_mut(source_id) {
                        sub.received += 1;
                    }
                    let remaining = state.remaining;
                    state.outgoing.push_back(Emission {
                        media: Some(media),
                        remaining,
                        error: None,
                    });
                    if remaining == 0 {
                        state.finished = true;
                    }
                }
            }

            if terminator && !state.finished {
                if let Some(error) = &item.error {
                    if *error != BrokerError::Cancelled {
                        tracing::warn!(
                            operation_id = %self.id(),
                            source = %source_id,
                            %error,
                            "Sub-search failed"
                        );
                    }
                }

                let mut complete = false;
                if let Some(sub) = state.subs.get_mut(source_id) {
                    sub.done = true;
                    complete = item.error.is_none() && sub.received >= sub.requested;
                }
                state.pending -= 1;
                if complete {
                    if let Some(source) = self.broker.ctx.registry.get(source_id) {
                        state.more.push(source);
                    }
                }

                if state.pending == 0 {
                    if !state.cancelled && state.remaining > 0 && !state.more.is_empty() {
                        let sources = std::mem::take(&mut state.more);
                        next_round = Some((sources, state.remaining));
                    } else {
                        let error = state.cancelled.then_some(BrokerError::Cancelled);
                        state.finished = true;
                        state.outgoing.push_back(Emission::terminator(error));
                    }
                }
            }
        }

        if self.state.lock().finished {
            self.broker.ctx.ledger.mark_completed(self.id());
        }
        self.drain();

        if let Some((sources, count)) = next_round {
            self.start_round(sources, count);
        }
    }

    /// Forward queued emissions in order, from one thread at a time.
    fn drain(&self) {
        {
            let mut state = self.state.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let item = {
                let mut state = self.state.lock();
                match state.outgoing.pop_front() {
                    Some(item) => item,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            if let Some(delivery) = self.delivery.get() {
                delivery.push(item);
            }
        }
    }

    fn cancel(&self) {
        let subs: Vec<OperationId> = {
            let mut state = self.state.lock();
            state.cancelled = true;
            state
                .subs
                .values()
                .filter(|sub| !sub.done)
                .filter_map(|sub| sub.operation_id)
                .collect()
        };
        for sub_id in subs {
            self.broker.ctx.ledger.cancel(sub_id);
        }
    }
}

impl Broker {
    /// Search every source that implements search, as one stream of at
    /// most `count` results.
    pub fn multiple_search<F>(
        &self,
        text: Option<&str>,
        keys: &[KeyId],
        count: u32,
        flags: ResolutionFlags,
        callback: F,
    ) -> Result<OperationId>
    where
        F: Fn(ResultItem) + Send + Sync + 'static,
    {
        if count == 0 {
            return Err(BrokerError::validation("count must be at least 1"));
        }

        let sources = self.ctx.registry.sources_supporting(Operation::Search);
        if sources.is_empty() {
            let operation_id = self.ctx.ledger.begin(MULTIPLE_SOURCE_ID, None);
            let delivery = UserDelivery::new(Arc::clone(&self.ctx), operation_id, Arc::new(callback));
            let ctx = Arc::clone(&self.ctx);
            self.ctx.scheduler.post(move || {
                let error = if ctx.ledger.is_cancelled(operation_id) {
                    BrokerError::Cancelled
                } else {
                    BrokerError::provider(ErrorCode::SearchFailed, "No searchable sources available")
                };
                ctx.ledger.mark_completed(operation_id);
                delivery.push(Emission::terminator(Some(error)));
            });
            return Ok(operation_id);
        }

        let search = Arc::new(MultipleSearch {
            broker: self.clone(),
            text: text.map(str::to_string),
            keys: keys.to_vec(),
            flags,
            delivery: OnceLock::new(),
            operation_id: OnceLock::new(),
            state: Mutex::new(SearchState {
                remaining: count,
                round: 0,
                pending: 0,
                subs: HashMap::new(),
                offsets: HashMap::new(),
                more: Vec::new(),
                cancelled: false,
                finished: false,
                outgoing: VecDeque::new(),
                delivering: false,
            }),
        });

        let hook_search = Arc::clone(&search);
        let hook: CancelHook = Arc::new(move |_| hook_search.cancel());
        let operation_id = self.ctx.ledger.begin(MULTIPLE_SOURCE_ID, Some(hook));
        let _ = search.operation_id.set(operation_id);
        let _ = search.delivery.set(UserDelivery::new(
            Arc::clone(&self.ctx),
            operation_id,
            Arc::new(callback),
        ));

        search.start_round(sources, count);
        Ok(operation_id)
    }
}
