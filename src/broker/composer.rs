//! Full-resolution composer.
//!
//! Sits between the relay and the caller when other sources must fill keys
//! the primary source cannot. Every item fans out one resolve call per
//! augmenting source; the item is released once all of them answered, and
//! items are always released in the order they arrived.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use mediaweave_common::{ErrorCode, KeyId, Media, OperationId};

use super::pipeline::{Emission, Stage};
use super::plan::KeyAssignment;
use super::BrokerContext;
use crate::options::OperationOptions;
use crate::source::{Completion, ResolveSpec};

type Done = Box<dyn FnOnce(Media) + Send>;

/// Join point of the augmenting calls for one record.
struct Augmentation {
    state: Mutex<AugmentationState>,
}

struct AugmentationState {
    media: Option<Media>,
    outstanding: usize,
    done: Option<Done>,
}

impl Augmentation {
    fn settle(&self, answer: Option<(&Media, &[KeyId])>) {
        let finished = {
            let mut state = self.state.lock();
            if let (Some(media), Some((other, keys))) = (state.media.as_mut(), answer) {
                media.merge_keys(other, keys);
            }
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.outstanding == 0 {
                state.media.take().zip(state.done.take())
            } else {
                None
            }
        };

        if let Some((media, done)) = finished {
            done(media);
        }
    }
}

/// Resolve the keys of every assignment on `media` and pass the merged
/// record to `done`.
///
/// Each resolve call is posted to the scheduler. Failed calls are logged and
/// leave the record as it was.
pub(crate) fn augment<F>(
    ctx: &Arc<BrokerContext>,
    operation_id: OperationId,
    media: Media,
    assignments: &[KeyAssignment],
    done: F,
) where
    F: FnOnce(Media) + Send + 'static,
{
    if assignments.is_empty() {
        done(media);
        return;
    }

    let join = Arc::new(Augmentation {
        state: Mutex::new(AugmentationState {
            media: Some(media.clone()),
            outstanding: assignments.len(),
            done: Some(Box::new(done)),
        }),
    });

    for assignment in assignments {
        let join = Arc::clone(&join);
        let source = Arc::clone(&assignment.source);
        let keys = assignment.keys.clone();
        let request = media.clone();

        ctx.scheduler.post(move || {
            let Some(resolver) = source.resolver() else {
                join.settle(None);
                return;
            };

            let source_id = source.id().to_string();
            let merge_keys = keys.clone();
            let completion = Completion::new(operation_id, ErrorCode::ResolveFailed, move |result| {
                match result {
                    Ok(answer) => join.settle(Some((&answer, &merge_keys))),
                    Err(error) => {
                        tracing::warn!(
                            %operation_id,
                            source = %source_id,
                            %error,
                            "Augmenting resolve failed"
                        );
                        join.settle(None);
                    }
                }
            });

            resolver.resolve(ResolveSpec {
                operation_id,
                media: request,
                keys,
                options: OperationOptions::new(None),
                completion,
            });
        });
    }
}

struct Slot {
    item: Emission,
    ready: bool,
}

struct ComposerState {
    assignments: Option<Arc<[KeyAssignment]>>,
    next_seq: u64,
    head: u64,
    waiting: BTreeMap<u64, Slot>,
    outgoing: VecDeque<Emission>,
    delivering: bool,
}

pub(crate) struct Composer {
    me: Weak<Composer>,
    ctx: Arc<BrokerContext>,
    operation_id: OperationId,
    next: Arc<dyn Stage>,
    state: Mutex<ComposerState>,
}

impl Composer {
    pub fn new(
        ctx: Arc<BrokerContext>,
        operation_id: OperationId,
        assignments: Vec<KeyAssignment>,
        next: Arc<dyn Stage>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Composer {
            me: me.clone(),
            ctx,
            operation_id,
            next,
            state: Mutex::new(ComposerState {
                assignments: Some(assignments.into()),
                next_seq: 0,
                head: 0,
                waiting: BTreeMap::new(),
                outgoing: VecDeque::new(),
                delivering: false,
            }),
        })
    }

    fn settle(&self, seq: u64, media: Media) {
        {
            let mut state = self.state.lock();
            match state.waiting.get_mut(&seq) {
                Some(slot) => {
                    slot.item.media = Some(media);
                    slot.ready = true;
                }
                None => {
                    tracing::warn!(operation_id = %self.operation_id, seq, "Augmented item has no slot");
                    return;
                }
            }
        }
        self.drain();
    }

    /// Forward every ready item at the head of the queue, in order.
    ///
    /// Only one thread forwards at a time; others leave their items queued
    /// for it.
    fn drain(&self) {
        {
            let mut state = self.state.lock();
            loop {
                let head = state.head;
                match state.waiting.get(&head) {
                    Some(slot) if slot.ready => {}
                    _ => break,
                }
                if let Some(slot) = state.waiting.remove(&head) {
                    state.outgoing.push_back(slot.item);
                }
                state.head += 1;
            }
            if state.delivering {
                return;
            }
            state.delivering = true;
        }

        loop {
            let item = {
                let mut state = self.state.lock();
                match state.outgoing.pop_front() {
                    Some(item) => {
                        if item.is_last() {
                            state.assignments = None;
                        }
                        item
                    }
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            self.next.push(item);
        }
    }
}

impl Stage for Composer {
    fn push(&self, mut item: Emission) {
        let pending = {
            let mut state = self.state.lock();
            let Some(assignments) = state.assignments.clone() else {
                tracing::warn!(
                    operation_id = %self.operation_id,
                    "Result arrived after full resolution finished"
                );
                return;
            };
            let seq = state.next_seq;
            state.next_seq += 1;

            let media = item.media.take();
            let ready = media.is_none();
            state.waiting.insert(seq, Slot { item, ready });
            media.map(|media| (seq, media, assignments))
        };

        match pending {
            Some((seq, media, assignments)) => {
                // The relay may be gone by the time the augmentation answers,
                // so each pending record keeps the composer alive.
                let Some(composer) = self.me.upgrade() else {
                    tracing::warn!(
                        operation_id = %self.operation_id,
                        "Composer released while results were arriving"
                    );
                    return;
                };
                augment(&self.ctx, self.operation_id, media, &assignments, move |media| {
                    composer.settle(seq, media);
                });
            }
            None => self.drain(),
        }
    }
}
