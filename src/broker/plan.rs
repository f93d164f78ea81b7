//! Key planning: slow-key filtering and full-resolution source maps.

use std::sync::Arc;

use mediaweave_common::{KeyId, Operation};

use crate::source::{Source, SourceRegistry};

/// Keys one augmenting source is asked to resolve.
#[derive(Clone)]
pub(crate) struct KeyAssignment {
    pub source: Arc<dyn Source>,
    pub keys: Vec<KeyId>,
}

impl std::fmt::Debug for KeyAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAssignment")
            .field("source", &self.source.id())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Outcome of full-resolution planning.
#[derive(Debug, Default)]
pub(crate) struct ResolutionPlan {
    /// Keys to request from the primary source, including dependencies of
    /// keys assigned elsewhere.
    pub keys: Vec<KeyId>,
    /// Augmenting sources in rank order. Empty means normal resolution.
    pub assignments: Vec<KeyAssignment>,
}

/// Drop the keys `source` declares as slow.
pub(crate) fn filter_slow_keys(source: &dyn Source, keys: &[KeyId]) -> Vec<KeyId> {
    let slow = source.slow_keys();
    keys.iter()
        .filter(|key| !slow.contains(key))
        .cloned()
        .collect()
}

/// Work out which other sources can supply the keys `primary` cannot.
///
/// Sources are tried in rank order. The first source able to resolve a
/// missing key claims it; the key is assigned when every key it depends on
/// is one the primary supplies, and dropped otherwise. With `fast_only`,
/// keys a source declares slow are not assigned to it.
pub(crate) fn plan_full_resolution(
    registry: &SourceRegistry,
    primary: &dyn Source,
    keys: &[KeyId],
    fast_only: bool,
) -> ResolutionPlan {
    let primary_keys = primary.supported_keys();
    let mut request_keys = keys.to_vec();
    let mut missing: Vec<KeyId> = keys
        .iter()
        .filter(|key| !primary_keys.contains(key))
        .cloned()
        .collect();

    let mut assignments = Vec::new();
    if missing.is_empty() {
        return ResolutionPlan {
            keys: request_keys,
            assignments,
        };
    }

    for source in registry.sources_supporting(Operation::Resolve) {
        if missing.is_empty() {
            break;
        }
        if source.id() == primary.id() {
            continue;
        }

        let slow = if fast_only {
            source.slow_keys()
        } else {
            Vec::new()
        };
        let mut assigned = Vec::new();

        missing.retain(|key| {
            if slow.contains(key) {
                return true;
            }
            let Some(deps) = registry.declared_key_dependencies(source.id(), key) else {
                return true;
            };
            if deps.iter().all(|dep| primary_keys.contains(dep)) {
                for dep in deps {
                    if !request_keys.contains(&dep) {
                        request_keys.push(dep);
                    }
                }
                assigned.push(key.clone());
            } else {
                tracing::debug!(
                    source = %source.id(),
                    key = %key,
                    "Dependencies not available from primary source, dropping key"
                );
            }
            false
        });

        if !assigned.is_empty() {
            tracing::debug!(source = %source.id(), keys = ?assigned, "Full resolution: augmenting source");
            assignments.push(KeyAssignment {
                source,
                keys: assigned,
            });
        }
    }

    ResolutionPlan {
        keys: request_keys,
        assignments,
    }
}
