//! Stage chain a result stream flows through.
//!
//! Built once per browse, search or query: the relay stage the source writes
//! into, an optional full-resolution composer, and the delivery stage that
//! hands results to the caller. Each stage forwards exactly one terminator
//! (`remaining == 0`) and drops its per-call state when it does.

use std::sync::Arc;

use parking_lot::Mutex;

use mediaweave_common::{BrokerError, Media, OperationId};

use super::BrokerContext;

/// One result travelling between stages.
#[derive(Debug)]
pub(crate) struct Emission {
    pub media: Option<Media>,
    pub remaining: u32,
    pub error: Option<BrokerError>,
}

impl Emission {
    pub fn terminator(error: Option<BrokerError>) -> Self {
        Self {
            media: None,
            remaining: 0,
            error,
        }
    }

    pub fn is_last(&self) -> bool {
        self.remaining == 0
    }
}

pub(crate) trait Stage: Send + Sync {
    fn push(&self, item: Emission);
}

/// A result as seen by the caller.
///
/// Every item of a stream carries `media` and the number of items still to
/// come. The stream ends with exactly one terminator: no media, `remaining`
/// 0, and the error the operation ended with, if any.
#[derive(Debug, Clone)]
pub struct ResultItem {
    pub operation_id: OperationId,
    pub media: Option<Media>,
    pub remaining: u32,
    pub error: Option<BrokerError>,
}

impl ResultItem {
    pub fn is_terminator(&self) -> bool {
        self.media.is_none() && self.remaining == 0
    }
}

/// Caller callback for result streams.
pub type ResultCallback = Arc<dyn Fn(ResultItem) + Send + Sync>;

/// Outermost stage: hands results to the caller and finishes the operation.
pub(crate) struct UserDelivery {
    ctx: Arc<BrokerContext>,
    operation_id: OperationId,
    callback: Mutex<Option<ResultCallback>>,
}

impl UserDelivery {
    pub fn new(ctx: Arc<BrokerContext>, operation_id: OperationId, callback: ResultCallback) -> Self {
        Self {
            ctx,
            operation_id,
            callback: Mutex::new(Some(callback)),
        }
    }

    fn deliver(&self, callback: &ResultCallback, media: Option<Media>, remaining: u32, error: Option<BrokerError>) {
        callback(ResultItem {
            operation_id: self.operation_id,
            media,
            remaining,
            error,
        });
    }
}

impl Stage for UserDelivery {
    fn push(&self, item: Emission) {
        let callback = if item.is_last() {
            self.callback.lock().take()
        } else {
            self.callback.lock().clone()
        };
        let Some(callback) = callback else {
            tracing::warn!(
                operation_id = %self.operation_id,
                remaining = item.remaining,
                "Result arrived after the operation finished"
            );
            return;
        };

        if !item.is_last() {
            if item.media.is_some() {
                self.deliver(&callback, item.media, item.remaining, None);
            }
            return;
        }

        if let Some(media) = item.media {
            self.deliver(&callback, Some(media), 0, None);
        }
        self.deliver(&callback, None, 0, item.error);
        self.ctx.ledger.mark_finished(self.operation_id);
    }
}
