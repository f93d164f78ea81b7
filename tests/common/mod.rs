//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a broker plus a recorder for result streams,
//! and a set of mock sources: a synchronous [`Catalog`], a [`Manual`]
//! source whose sinks the test drives by hand, an [`Augmenter`] whose
//! resolves can be answered in any order, a tokio-backed [`AsyncCatalog`],
//! and a [`Shelf`] that supports store and remove.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mediaweave::{
    keys, Broker, BrowseSpec, Browser, Caps, Config, ErrorCode, KeyId, Media, MediaKind,
    Operation, OperationId, OperationOptions, ProviderError, Querier, QuerySpec, RemoveSpec,
    Remover, ResolveSpec, Resolver, ResultItem, ResultSink, SearchSpec, Searcher, Source,
    StoreSpec, Storer, TypeFilter,
};

/// Broker under test.
pub struct TestHarness {
    pub broker: Broker,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            broker: Broker::new(config),
        }
    }

    pub fn register<S: Source + 'static>(&self, source: Arc<S>) -> Arc<S> {
        self.broker
            .register_source(source.clone())
            .expect("failed to register source");
        source
    }
}

/// Records every item a result callback receives.
#[derive(Clone, Default)]
pub struct Recorder {
    items: Arc<Mutex<Vec<ResultItem>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(ResultItem) + Send + Sync + 'static {
        let items = Arc::clone(&self.items);
        move |item| items.lock().push(item)
    }

    pub fn items(&self) -> Vec<ResultItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Ids of the delivered records, in delivery order.
    pub fn ids(&self) -> Vec<String> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| item.media.as_ref())
            .map(|media| media.id().unwrap_or_default().to_string())
            .collect()
    }

    pub fn remaining(&self) -> Vec<u32> {
        self.items
            .lock()
            .iter()
            .filter(|item| item.media.is_some())
            .map(|item| item.remaining)
            .collect()
    }

    pub fn terminators(&self) -> Vec<ResultItem> {
        self.items
            .lock()
            .iter()
            .filter(|item| item.is_terminator())
            .cloned()
            .collect()
    }
}

pub fn track(index: u32) -> Media {
    Media::new(MediaKind::Audio)
        .with_id(index.to_string())
        .with(keys::TITLE, format!("Track {index}"))
        .with(keys::ARTIST, format!("Artist {}", index % 3))
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One request a mock source received.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub skip: u32,
    pub count: Option<u32>,
    pub keys: Vec<KeyId>,
}

/// Answers browse, search and query synchronously from `size` tracks.
pub struct Catalog {
    pub id: &'static str,
    pub size: u32,
    pub threshold: u32,
    pub slow: Vec<KeyId>,
    pub caps: Arc<Caps>,
    pub calls: Mutex<Vec<Call>>,
}

impl Catalog {
    pub fn new(id: &'static str, size: u32) -> Self {
        Self {
            id,
            size,
            threshold: 0,
            slow: Vec::new(),
            caps: Arc::new(
                Caps::new()
                    .with_type_filter(TypeFilter::AUDIO)
                    .with_key_filters([keys::ARTIST]),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn chunks(&self) -> Vec<(u32, Option<u32>)> {
        self.calls.lock().iter().map(|c| (c.skip, c.count)).collect()
    }

    fn answer(&self, operation: Operation, keys: Vec<KeyId>, options: &OperationOptions, sink: ResultSink) {
        let skip = options.skip();
        self.calls.lock().push(Call {
            operation,
            skip,
            count: options.count(),
            keys,
        });

        let count = options
            .count()
            .unwrap_or(u32::MAX)
            .min(self.size.saturating_sub(skip));
        if count == 0 {
            sink.finish();
            return;
        }
        for i in 0..count {
            sink.send(track(skip + i), count - i - 1);
        }
    }
}

impl Source for Catalog {
    fn id(&self) -> &str {
        self.id
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        vec![keys::ID, keys::TITLE, keys::ARTIST, keys::URL]
    }

    fn slow_keys(&self) -> Vec<KeyId> {
        self.slow.clone()
    }

    fn caps(&self, _operation: Operation) -> Arc<Caps> {
        Arc::clone(&self.caps)
    }

    fn auto_split_threshold(&self) -> u32 {
        self.threshold
    }

    fn browser(&self) -> Option<&dyn Browser> {
        Some(self)
    }

    fn searcher(&self) -> Option<&dyn Searcher> {
        Some(self)
    }

    fn querier(&self) -> Option<&dyn Querier> {
        Some(self)
    }

    fn resolver(&self) -> Option<&dyn Resolver> {
        Some(self)
    }
}

impl Browser for Catalog {
    fn browse(&self, spec: BrowseSpec) {
        self.answer(Operation::Browse, spec.keys, &spec.options, spec.sink);
    }
}

impl Searcher for Catalog {
    fn search(&self, spec: SearchSpec) {
        self.answer(Operation::Search, spec.keys, &spec.options, spec.sink);
    }
}

impl Querier for Catalog {
    fn query(&self, spec: QuerySpec) {
        self.answer(Operation::Query, spec.keys, &spec.options, spec.sink);
    }
}

impl Resolver for Catalog {
    fn resolve(&self, spec: ResolveSpec) {
        self.calls.lock().push(Call {
            operation: Operation::Resolve,
            skip: 0,
            count: None,
            keys: spec.keys.clone(),
        });
        let index: u32 = spec.media.id().and_then(|id| id.parse().ok()).unwrap_or(0);
        let mut media = track(index);
        if let Some(id) = spec.media.id() {
            media.set_id(id);
        }
        spec.completion.succeed(media);
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

/// Parks every browse so the test can emit results by hand.
pub struct Manual {
    pub sinks: Mutex<Vec<ResultSink>>,
    pub cancelled: Mutex<Vec<OperationId>>,
}

impl Manual {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn sink(&self) -> ResultSink {
        self.sinks
            .lock()
            .last()
            .cloned()
            .expect("no browse request parked")
    }
}

impl Source for Manual {
    fn id(&self) -> &str {
        "manual"
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        vec![keys::ID, keys::TITLE]
    }

    fn browser(&self) -> Option<&dyn Browser> {
        Some(self)
    }

    fn cancel(&self, operation_id: OperationId) {
        self.cancelled.lock().push(operation_id);
    }
}

impl Browser for Manual {
    fn browse(&self, spec: BrowseSpec) {
        self.sinks.lock().push(spec.sink);
    }
}

// ---------------------------------------------------------------------------
// Augmenter
// ---------------------------------------------------------------------------

/// Resolve-only source supplying `keys`. In parked mode requests wait until
/// [`Augmenter::answer`] is called for their record.
pub struct Augmenter {
    pub id: &'static str,
    pub rank: i32,
    pub keys: Vec<KeyId>,
    pub deps: Vec<KeyId>,
    pub parked: bool,
    pub fail: bool,
    pub requests: Mutex<Vec<ResolveSpec>>,
}

impl Augmenter {
    pub fn new(id: &'static str, keys: Vec<KeyId>) -> Self {
        Self {
            id,
            rank: 0,
            keys,
            deps: Vec::new(),
            parked: false,
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn parked(mut self) -> Self {
        self.parked = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn depends_on(mut self, deps: Vec<KeyId>) -> Self {
        self.deps = deps;
        self
    }

    pub fn pending(&self) -> usize {
        self.requests.lock().len()
    }

    /// Answer the parked request for the record with `media_id`.
    pub fn answer(&self, media_id: &str) {
        let spec = {
            let mut requests = self.requests.lock();
            let position = requests
                .iter()
                .position(|spec| spec.media.id() == Some(media_id))
                .expect("no parked request for record");
            requests.remove(position)
        };
        self.complete(spec);
    }

    fn complete(&self, spec: ResolveSpec) {
        if self.fail {
            spec.completion
                .fail(ProviderError::new(ErrorCode::ResolveFailed, "lookup failed"));
            return;
        }
        let id = spec.media.id().unwrap_or_default().to_string();
        let mut media = spec.media.clone();
        for key in &spec.keys {
            media.set(key.clone(), format!("{}-{}", key, id));
        }
        spec.completion.succeed(media);
    }
}

impl Source for Augmenter {
    fn id(&self) -> &str {
        self.id
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        self.keys.clone()
    }

    fn key_dependencies(&self, key: &KeyId) -> Option<Vec<KeyId>> {
        self.keys.contains(key).then(|| self.deps.clone())
    }

    fn resolver(&self) -> Option<&dyn Resolver> {
        Some(self)
    }
}

impl Resolver for Augmenter {
    fn resolve(&self, spec: ResolveSpec) {
        if self.parked {
            self.requests.lock().push(spec);
        } else {
            self.complete(spec);
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncCatalog
// ---------------------------------------------------------------------------

/// Browses `size` tracks from a tokio task, one every `delay`.
pub struct AsyncCatalog {
    pub size: u32,
    pub delay: Duration,
}

impl Source for AsyncCatalog {
    fn id(&self) -> &str {
        "async"
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        vec![keys::ID, keys::TITLE]
    }

    fn browser(&self) -> Option<&dyn Browser> {
        Some(self)
    }
}

impl Browser for AsyncCatalog {
    fn browse(&self, spec: BrowseSpec) {
        let count = spec.options.count().unwrap_or(self.size).min(self.size);
        let delay = self.delay;
        let sink = spec.sink;
        tokio::spawn(async move {
            if count == 0 {
                sink.finish();
                return;
            }
            for i in 0..count {
                tokio::time::sleep(delay).await;
                sink.send(track(i), count - i - 1);
            }
        });
    }
}

/// Browses `size` tracks from a plain thread.
pub struct ThreadedCatalog {
    pub size: u32,
}

impl Source for ThreadedCatalog {
    fn id(&self) -> &str {
        "threaded"
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        vec![keys::ID, keys::TITLE]
    }

    fn browser(&self) -> Option<&dyn Browser> {
        Some(self)
    }
}

impl Browser for ThreadedCatalog {
    fn browse(&self, spec: BrowseSpec) {
        let size = self.size;
        std::thread::spawn(move || {
            for i in 0..size {
                std::thread::sleep(Duration::from_millis(2));
                spec.sink.send(track(i), size - i - 1);
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Shelf
// ---------------------------------------------------------------------------

/// Writable in-memory source.
pub struct Shelf {
    pub items: Mutex<BTreeMap<String, Media>>,
    next_id: Mutex<u32>,
}

impl Shelf {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(1),
        }
    }
}

impl Source for Shelf {
    fn id(&self) -> &str {
        "shelf"
    }

    fn supported_keys(&self) -> Vec<KeyId> {
        vec![keys::ID, keys::TITLE]
    }

    fn writable_keys(&self) -> Vec<KeyId> {
        vec![keys::TITLE]
    }

    fn storer(&self) -> Option<&dyn Storer> {
        Some(self)
    }

    fn remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

impl Storer for Shelf {
    fn store(&self, spec: StoreSpec) {
        let id = {
            let mut next = self.next_id.lock();
            let id = format!("shelf-{}", *next);
            *next += 1;
            id
        };
        let mut media = spec.media;
        media.set_id(id.clone());
        self.items.lock().insert(id, media.clone());
        spec.completion.succeed(media);
    }
}

impl Remover for Shelf {
    fn remove(&self, spec: RemoveSpec) {
        let id = spec.media.id().unwrap_or_default().to_string();
        if self.items.lock().remove(&id).is_some() {
            spec.completion.succeed(());
        } else {
            spec.completion.fail(ProviderError::new(
                ErrorCode::MediaNotFound,
                format!("no record '{id}'"),
            ));
        }
    }
}
