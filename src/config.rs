//! Process-wide resolution configuration.

use ahash::AHashSet;

/// Controls how an unannotated single-parameter creator is classified.
///
/// Attached process-wide on [`BindConfig`]; a type's metadata may override it
/// per class.
///
/// # Examples
///
/// ```rust
/// use bindery::{BindConfig, SingleArgPolicy};
///
/// let config = BindConfig::new().single_arg_policy(SingleArgPolicy::Delegating);
/// assert_eq!(config.single_arg_default(), SingleArgPolicy::Delegating);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleArgPolicy {
    /// Legacy default: explicit parameter name means properties-based; a
    /// scalar-reducer accessor on the type means delegating; an injected
    /// parameter means properties-based; an implicit name matching a known
    /// property means properties-based; anything else delegates.
    Heuristic,
    /// Always classify as delegating (scalar or generic).
    Delegating,
    /// Always classify as properties-based; the single parameter must
    /// resolve a name or be injected, otherwise the definition is broken.
    Properties,
    /// Decorated creators must state their mode explicitly; an unspecified
    /// mode is a definition error.
    RequireMode,
}

/// Engine configuration shared by every resolution through one cache.
///
/// Immutable once handed to the cache. Covers the process-wide single-arg
/// classification policy and the set of raw types whose properties are never
/// bound.
#[derive(Debug, Clone)]
pub struct BindConfig {
    single_arg_policy: SingleArgPolicy,
    ignorable_types: AHashSet<String>,
}

impl BindConfig {
    /// Creates a configuration with the legacy heuristic single-arg policy
    /// and no ignorable types.
    pub fn new() -> Self {
        Self {
            single_arg_policy: SingleArgPolicy::Heuristic,
            ignorable_types: AHashSet::new(),
        }
    }

    /// Sets the process-wide single-argument classification policy.
    pub fn single_arg_policy(mut self, policy: SingleArgPolicy) -> Self {
        self.single_arg_policy = policy;
        self
    }

    /// Marks a raw type as ignorable: properties declared with this raw type
    /// are dropped during binding.
    pub fn ignorable_type(mut self, raw: impl Into<String>) -> Self {
        self.ignorable_types.insert(raw.into());
        self
    }

    /// The configured single-argument policy.
    pub fn single_arg_default(&self) -> SingleArgPolicy {
        self.single_arg_policy
    }

    /// Whether properties of the given raw type are ignorable.
    pub fn is_ignorable(&self, raw: &str) -> bool {
        self.ignorable_types.contains(raw)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self::new()
    }
}
