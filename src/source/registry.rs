//! Registry of the [`Source`]s known to one broker.
//!
//! The [`SourceRegistry`] answers the questions the broker asks while planning
//! an operation: which source has a given id, which sources implement an
//! operation (in rank order), what a source's caps are, and what a source
//! needs before it can resolve a key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use mediaweave_common::{BrokerError, KeyId, Operation, Result};

use super::Source;
use crate::options::Caps;

/// A registry of [`Source`] implementations.
///
/// Sources are kept in registration order. Listings are sorted by rank,
/// highest first, with ties broken by registration order. A rank override
/// (usually from configuration) replaces the rank the source declares.
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mediaweave::source::SourceRegistry;
///
/// let registry = SourceRegistry::new();
/// registry.register(Arc::new(my_source))?;
///
/// let resolvers = registry.sources_supporting(Operation::Resolve);
/// ```
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<Vec<Arc<dyn Source>>>,
    rank_overrides: RwLock<HashMap<String, i32>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new source.
    ///
    /// Fails if a source with the same id is already registered.
    pub fn register(&self, source: Arc<dyn Source>) -> Result<()> {
        let mut sources = self.sources.write();
        if sources.iter().any(|s| s.id() == source.id()) {
            return Err(BrokerError::validation(format!(
                "source '{}' is already registered",
                source.id()
            )));
        }
        tracing::debug!(source = %source.id(), ops = ?source.supported_operations(), "Registered source");
        sources.push(source);
        Ok(())
    }

    /// Remove a source. Returns it if it was registered.
    pub fn unregister(&self, source_id: &str) -> Option<Arc<dyn Source>> {
        let mut sources = self.sources.write();
        let pos = sources.iter().position(|s| s.id() == source_id)?;
        Some(sources.remove(pos))
    }

    /// Look up a source by its [`Source::id`].
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn Source>> {
        self.sources
            .read()
            .iter()
            .find(|s| s.id() == source_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// Replace the declared rank of `source_id`.
    pub fn set_rank(&self, source_id: &str, rank: i32) {
        self.rank_overrides
            .write()
            .insert(source_id.to_string(), rank);
    }

    /// Effective rank of a source.
    pub fn rank_of(&self, source: &dyn Source) -> i32 {
        self.rank_overrides
            .read()
            .get(source.id())
            .copied()
            .unwrap_or_else(|| source.rank())
    }

    /// All sources, highest rank first.
    pub fn sources(&self) -> Vec<Arc<dyn Source>> {
        let mut sources = self.sources.read().clone();
        // Stable sort keeps registration order among equal ranks.
        sources.sort_by_key(|s| std::cmp::Reverse(self.rank_of(s.as_ref())));
        sources
    }

    /// Sources implementing `operation`, highest rank first.
    pub fn sources_supporting(&self, operation: Operation) -> Vec<Arc<dyn Source>> {
        self.sources()
            .into_iter()
            .filter(|s| s.supported_operations().supports(operation))
            .collect()
    }

    /// Caps of `source_id` for `operation`, if the source is registered.
    pub fn capabilities_of(&self, source_id: &str, operation: Operation) -> Option<Arc<Caps>> {
        self.get(source_id).map(|s| s.caps(operation))
    }

    /// Keys `source_id` needs before it can resolve `key`.
    ///
    /// `None` when the source is unknown or cannot resolve `key`.
    pub fn declared_key_dependencies(&self, source_id: &str, key: &KeyId) -> Option<Vec<KeyId>> {
        self.get(source_id)?.key_dependencies(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Browser, BrowseSpec, Resolver, ResolveSpec};
    use mediaweave_common::{keys, TypeFilter};

    /// A minimal stub source used for testing.
    struct StubSource {
        source_id: &'static str,
        rank: i32,
        browse: bool,
        resolve: bool,
    }

    impl StubSource {
        fn new(source_id: &'static str, rank: i32) -> Self {
            Self {
                source_id,
                rank,
                browse: true,
                resolve: false,
            }
        }
    }

    impl Source for StubSource {
        fn id(&self) -> &str {
            self.source_id
        }

        fn rank(&self) -> i32 {
            self.rank
        }

        fn supported_keys(&self) -> Vec<KeyId> {
            vec![keys::TITLE, keys::ALBUM]
        }

        fn key_dependencies(&self, key: &KeyId) -> Option<Vec<KeyId>> {
            (key == &keys::ALBUM).then(|| vec![keys::TITLE])
        }

        fn caps(&self, operation: Operation) -> Arc<Caps> {
            match operation {
                Operation::Browse => Arc::new(Caps::new().with_type_filter(TypeFilter::AUDIO)),
                _ => Arc::new(Caps::new()),
            }
        }

        fn browser(&self) -> Option<&dyn Browser> {
            self.browse.then_some(self as &dyn Browser)
        }

        fn resolver(&self) -> Option<&dyn Resolver> {
            self.resolve.then_some(self as &dyn Resolver)
        }
    }

    impl Browser for StubSource {
        fn browse(&self, spec: BrowseSpec) {
            spec.sink.finish();
        }
    }

    impl Resolver for StubSource {
        fn resolve(&self, spec: ResolveSpec) {
            spec.completion.succeed(spec.media);
        }
    }

    #[test]
    fn empty_registry() {
        let registry = SourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("jamendo").is_none());
        assert!(registry.sources_supporting(Operation::Browse).is_empty());
    }

    #[test]
    fn register_and_lookup() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("jamendo", 0))).unwrap();
        registry.register(Arc::new(StubSource::new("flickr", 0))).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("flickr").unwrap().id(), "flickr");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("jamendo", 0))).unwrap();
        let err = registry
            .register(Arc::new(StubSource::new("jamendo", 5)))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Validation(_)));
    }

    #[test]
    fn sources_sorted_by_rank_then_registration() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("low", -1))).unwrap();
        registry.register(Arc::new(StubSource::new("first", 3))).unwrap();
        registry.register(Arc::new(StubSource::new("second", 3))).unwrap();

        let ids: Vec<String> = registry.sources().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["first", "second", "low"]);

        registry.set_rank("low", 10);
        let ids: Vec<String> = registry.sources().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["low", "first", "second"]);
    }

    #[test]
    fn sources_supporting_filters_by_slot() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("browse-only", 0))).unwrap();
        registry
            .register(Arc::new(StubSource {
                resolve: true,
                ..StubSource::new("resolver", 0)
            }))
            .unwrap();

        let resolvers = registry.sources_supporting(Operation::Resolve);
        assert_eq!(resolvers.len(), 1);
        assert_eq!(resolvers[0].id(), "resolver");
        assert_eq!(registry.sources_supporting(Operation::Browse).len(), 2);
    }

    #[test]
    fn caps_and_dependencies() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("jamendo", 0))).unwrap();

        let caps = registry.capabilities_of("jamendo", Operation::Browse).unwrap();
        assert!(caps.test_type_filter(TypeFilter::AUDIO));
        assert!(registry.capabilities_of("missing", Operation::Browse).is_none());

        assert_eq!(
            registry.declared_key_dependencies("jamendo", &keys::ALBUM),
            Some(vec![keys::TITLE])
        );
        assert_eq!(registry.declared_key_dependencies("jamendo", &keys::TITLE), None);
    }

    #[test]
    fn unregister_removes_source() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(StubSource::new("jamendo", 0))).unwrap();
        assert!(registry.unregister("jamendo").is_some());
        assert!(registry.unregister("jamendo").is_none());
        assert!(registry.is_empty());
    }
}
