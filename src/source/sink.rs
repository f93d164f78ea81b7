//! Channels a source answers through.

use std::fmt;
use std::sync::Arc;

use mediaweave_common::{BrokerError, ErrorCode, Media, OperationId, ProviderError};

use crate::broker::pipeline::{Emission, Stage};

/// Receives the result stream of a browse, search or query.
///
/// Call [`ResultSink::send`] once per item with the number of items still to
/// come, and end the stream with exactly one call carrying `remaining == 0`:
/// either the last item, [`ResultSink::finish`], or [`ResultSink::fail`].
/// Sinks are cheap to clone and may be moved to other threads.
#[derive(Clone)]
pub struct ResultSink {
    operation_id: OperationId,
    stage: Arc<dyn Stage>,
}

impl ResultSink {
    pub(crate) fn new(operation_id: OperationId, stage: Arc<dyn Stage>) -> Self {
        Self {
            operation_id,
            stage,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Emit one item.
    pub fn send(&self, media: Media, remaining: u32) {
        self.emit(Some(media), remaining, None);
    }

    /// End the stream without a final item.
    pub fn finish(&self) {
        self.emit(None, 0, None);
    }

    /// End the stream with an error.
    pub fn fail(&self, error: ProviderError) {
        self.emit(None, 0, Some(error));
    }

    /// Emit a raw result.
    pub fn emit(&self, media: Option<Media>, remaining: u32, error: Option<ProviderError>) {
        self.stage.push(Emission {
            media,
            remaining,
            error: error.map(BrokerError::Provider),
        });
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink")
            .field("operation_id", &self.operation_id)
            .finish()
    }
}

type Answer<T> = Box<dyn FnOnce(Result<T, ProviderError>) + Send>;

/// Single answer to a resolve, store or remove request.
///
/// Consumed by answering. A completion dropped without an answer reports a
/// provider error so the operation still terminates.
pub struct Completion<T> {
    operation_id: OperationId,
    code: ErrorCode,
    answer: Option<Answer<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn new<F>(operation_id: OperationId, code: ErrorCode, answer: F) -> Self
    where
        F: FnOnce(Result<T, ProviderError>) + Send + 'static,
    {
        Self {
            operation_id,
            code,
            answer: Some(Box::new(answer)),
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    /// Error code a failure of this request should carry.
    pub fn error_code(&self) -> ErrorCode {
        self.code
    }

    pub fn complete(mut self, result: Result<T, ProviderError>) {
        if let Some(answer) = self.answer.take() {
            answer(result);
        }
    }

    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    pub fn fail(self, error: ProviderError) {
        self.complete(Err(error));
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(answer) = self.answer.take() {
            tracing::warn!(
                operation_id = %self.operation_id,
                "Request dropped by source without an answer"
            );
            answer(Err(ProviderError::new(
                self.code,
                "source dropped the request without answering",
            )));
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("operation_id", &self.operation_id)
            .field("answered", &self.answer.is_none())
            .finish()
    }
}
