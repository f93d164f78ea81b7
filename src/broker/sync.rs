//! Blocking and async conveniences.
//!
//! Each `*_sync` method starts an operation and drains the scheduler on the
//! calling thread until it ends; each `*_collect` method does the same from
//! async code. Result streams are gathered in delivery order and the first
//! error wins. When the configured timeout elapses the operation is
//! cancelled and [`BrokerError::Cancelled`] is returned.

use std::sync::Arc;

use parking_lot::Mutex;

use mediaweave_common::{BrokerError, KeyId, Media, OperationId, ResolutionFlags, Result};

use super::pipeline::ResultItem;
use super::{Broker, BrokerContext};
use crate::options::OperationOptions;

#[derive(Default)]
struct Collected {
    items: Vec<Media>,
    outcome: Option<Result<()>>,
}

type StreamSlot = Arc<Mutex<Collected>>;
type AnswerSlot<T> = Arc<Mutex<Option<Result<T>>>>;

fn stream_collector(ctx: &Arc<BrokerContext>) -> (StreamSlot, impl Fn(ResultItem) + Send + Sync + 'static) {
    let collected: StreamSlot = Arc::new(Mutex::new(Collected::default()));
    let slot = Arc::clone(&collected);
    let ctx = Arc::clone(ctx);

    let callback = move |item: ResultItem| {
        let last = item.is_terminator();
        {
            let mut collected = slot.lock();
            if let Some(media) = item.media {
                collected.items.push(media);
            }
            if last {
                collected.outcome = Some(match item.error {
                    Some(error) => Err(error),
                    None => Ok(()),
                });
            }
        }
        if last {
            ctx.scheduler.wake();
        }
    };
    (collected, callback)
}

fn answer_collector<T: Send + 'static>(
    ctx: &Arc<BrokerContext>,
) -> (AnswerSlot<T>, impl FnOnce(OperationId, Result<T>) + Send + 'static) {
    let answer: AnswerSlot<T> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&answer);
    let ctx = Arc::clone(ctx);

    let callback = move |_: OperationId, result: Result<T>| {
        *slot.lock() = Some(result);
        ctx.scheduler.wake();
    };
    (answer, callback)
}

fn take_stream(collected: &StreamSlot) -> Result<Vec<Media>> {
    let mut collected = collected.lock();
    match collected.outcome.take() {
        Some(Err(error)) => Err(error),
        _ => Ok(std::mem::take(&mut collected.items)),
    }
}

fn take_answer<T>(answer: &AnswerSlot<T>) -> Result<T> {
    answer.lock().take().unwrap_or(Err(BrokerError::Cancelled))
}

impl Broker {
    /// Drain the scheduler until `done`, cancelling on timeout.
    fn block_on_operation(&self, operation_id: OperationId, done: impl Fn() -> bool) -> Result<()> {
        let timeout = self.ctx.config.broker.sync_timeout();
        if self.ctx.scheduler.block_until(done, timeout) {
            return Ok(());
        }
        tracing::warn!(%operation_id, ?timeout, "Timed out waiting for operation, cancelling");
        self.cancel(operation_id);
        Err(BrokerError::Cancelled)
    }

    async fn drive_operation(&self, operation_id: OperationId, done: impl Fn() -> bool) -> Result<()> {
        let drive = self.ctx.scheduler.drive_until(done);
        match self.ctx.config.broker.sync_timeout() {
            Some(limit) => {
                if tokio::time::timeout(limit, drive).await.is_err() {
                    tracing::warn!(%operation_id, ?limit, "Timed out waiting for operation, cancelling");
                    self.cancel(operation_id);
                    return Err(BrokerError::Cancelled);
                }
            }
            None => drive.await,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Blocking
    // ------------------------------------------------------------------

    pub fn browse_sync(
        &self,
        source_id: &str,
        container: Option<&Media>,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.browse(source_id, container, keys, options, callback)?;
        self.block_on_operation(id, || collected.lock().outcome.is_some())?;
        take_stream(&collected)
    }

    pub fn search_sync(
        &self,
        source_id: &str,
        text: Option<&str>,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.search(source_id, text, keys, options, callback)?;
        self.block_on_operation(id, || collected.lock().outcome.is_some())?;
        take_stream(&collected)
    }

    pub fn query_sync(
        &self,
        source_id: &str,
        query: &str,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.query(source_id, query, keys, options, callback)?;
        self.block_on_operation(id, || collected.lock().outcome.is_some())?;
        take_stream(&collected)
    }

    pub fn multiple_search_sync(
        &self,
        text: Option<&str>,
        keys: &[KeyId],
        count: u32,
        flags: ResolutionFlags,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.multiple_search(text, keys, count, flags, callback)?;
        self.block_on_operation(id, || collected.lock().outcome.is_some())?;
        take_stream(&collected)
    }

    pub fn resolve_sync(
        &self,
        source_id: &str,
        media: &Media,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Media> {
        let (answer, callback) = answer_collector(&self.ctx);
        let id = self.resolve(source_id, media, keys, options, callback)?;
        self.block_on_operation(id, || answer.lock().is_some())?;
        take_answer(&answer)
    }

    pub fn store_sync(&self, source_id: &str, parent: Option<&Media>, media: Media) -> Result<Media> {
        let (answer, callback) = answer_collector(&self.ctx);
        let id = self.store(source_id, parent, media, callback)?;
        self.block_on_operation(id, || answer.lock().is_some())?;
        take_answer(&answer)
    }

    pub fn remove_sync(&self, source_id: &str, media: &Media) -> Result<()> {
        let (answer, callback) = answer_collector(&self.ctx);
        let id = self.remove(source_id, media, callback)?;
        self.block_on_operation(id, || answer.lock().is_some())?;
        take_answer(&answer)
    }

    // ------------------------------------------------------------------
    // Async
    // ------------------------------------------------------------------

    pub async fn browse_collect(
        &self,
        source_id: &str,
        container: Option<&Media>,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.browse(source_id, container, keys, options, callback)?;
        self.drive_operation(id, || collected.lock().outcome.is_some())
            .await?;
        take_stream(&collected)
    }

    pub async fn search_collect(
        &self,
        source_id: &str,
        text: Option<&str>,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.search(source_id, text, keys, options, callback)?;
        self.drive_operation(id, || collected.lock().outcome.is_some())
            .await?;
        take_stream(&collected)
    }

    pub async fn query_collect(
        &self,
        source_id: &str,
        query: &str,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Vec<Media>> {
        let (collected, callback) = stream_collector(&self.ctx);
        let id = self.query(source_id, query, keys, options, callback)?;
        self.drive_operation(id, || collected.lock().outcome.is_some())
            .await?;
        take_stream(&collected)
    }

    pub async fn resolve_collect(
        &self,
        source_id: &str,
        media: &Media,
        keys: &[KeyId],
        options: OperationOptions,
    ) -> Result<Media> {
        let (answer, callback) = answer_collector(&self.ctx);
        let id = self.resolve(source_id, media, keys, options, callback)?;
        self.drive_operation(id, || answer.lock().is_some()).await?;
        take_answer(&answer)
    }
}
