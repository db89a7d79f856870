//! Concurrency-safe memoizing resolution cache.
//!
//! Resolution has two tiers: a read-mostly permanent cache of finished
//! handlers, and a single exclusive construction section whose in-flight
//! registry breaks cyclic type graphs. Handlers are committed to the
//! permanent cache only after successful finalization, and only when they
//! declare themselves cacheable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, trace};

use crate::binder::bind_properties;
use crate::config::BindConfig;
use crate::creator::select_instantiation;
use crate::descriptor::TypeDescriptor;
use crate::error::BindResult;
use crate::handler::Handler;
use crate::metadata::MetadataProvider;

type HandlerMap = HashMap<TypeDescriptor, Arc<Handler>, RandomState>;

/// State of the exclusive construction section.
#[derive(Default)]
struct InFlight {
    /// Handlers registered before finalization; consulted by cyclic lookups.
    building: HandlerMap,
    /// Types committed to the permanent cache during the current top-level
    /// resolution; rolled back if that resolution ultimately fails.
    committed: Vec<TypeDescriptor>,
}

/// Memoizing handler cache shared across threads.
///
/// Clones of the same `Arc<ResolutionCache>` may resolve concurrently: reads
/// of the permanent cache take a shared lock, while construction of missing
/// handlers is serialized through one reentrant section. A resolution that
/// recursively needs a type already under construction (a cyclic graph)
/// receives the structurally complete in-flight handler instead of
/// recursing forever.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use bindery::{
///     BindConfig, MetadataRegistry, ResolutionCache, TypeDescriptor, TypeMetadata,
/// };
/// use serde_json::json;
///
/// let mut registry = MetadataRegistry::new();
/// registry.register(
///     TypeDescriptor::of("Empty"),
///     TypeMetadata::new().with_constructor(bindery::CreatorCandidate::constructor("Empty()")),
/// );
///
/// let cache = ResolutionCache::new(Arc::new(registry), BindConfig::new());
/// let handler = cache.resolve(&TypeDescriptor::of("Empty")).unwrap();
/// assert_eq!(handler.build(&json!({})).unwrap(), json!({}));
/// assert_eq!(cache.size(), 1);
/// ```
pub struct ResolutionCache {
    provider: Arc<dyn MetadataProvider>,
    config: BindConfig,
    cached: RwLock<HandlerMap>,
    // ReentrantMutex lets recursive resolve calls from finalization re-enter
    // the section on the same thread; the RefCell holds the in-flight
    // registry and is only ever borrowed while the section is held.
    construction: ReentrantMutex<RefCell<InFlight>>,
}

impl ResolutionCache {
    /// Creates an empty cache over the given metadata provider.
    pub fn new(provider: Arc<dyn MetadataProvider>, config: BindConfig) -> Self {
        Self {
            provider,
            config,
            cached: RwLock::new(HandlerMap::default()),
            construction: ReentrantMutex::new(RefCell::new(InFlight::default())),
        }
    }

    /// Resolves the handler for `ty`, constructing and memoizing it on a
    /// miss.
    ///
    /// Identical descriptors resolve to the same handler instance for the
    /// lifetime of the cache (unless the type opted out of sharing). A
    /// descriptor carrying a per-call build override always gets a fresh,
    /// uncached pass-through handler.
    pub fn resolve(&self, ty: &TypeDescriptor) -> BindResult<Arc<Handler>> {
        if let Some(build) = ty.build_override() {
            return Ok(Arc::new(Handler::from_override(ty.clone(), build.clone())));
        }
        if let Some(handler) = self.cached.read().get(ty) {
            return Ok(handler.clone());
        }

        let section = self.construction.lock();
        // Another thread may have finished this type while we waited.
        if let Some(handler) = self.cached.read().get(ty) {
            return Ok(handler.clone());
        }
        if let Some(handler) = section.borrow().building.get(ty) {
            trace!(ty = %ty, "cyclic resolution served from in-flight registry");
            return Ok(handler.clone());
        }

        let top_level = section.borrow().building.is_empty();
        let result = self.construct(ty, &section);
        if top_level {
            let mut flight = section.borrow_mut();
            if result.is_err() {
                // Dependents committed while this resolution was still in
                // progress may hold never-finalized slots; take them back
                // out so a retry reconstructs them from scratch.
                let mut cached = self.cached.write();
                for t in &flight.committed {
                    cached.remove(t);
                }
            }
            flight.committed.clear();
            // A failed construction can also leave partially finalized
            // entries behind; the outermost frame clears them.
            flight.building.clear();
        }
        result
    }

    fn construct(
        &self,
        ty: &TypeDescriptor,
        in_flight: &RefCell<InFlight>,
    ) -> BindResult<Arc<Handler>> {
        let meta = self.provider.describe(ty)?;
        let strategy = select_instantiation(ty, &meta, &self.config)?;
        let bound = bind_properties(ty, &strategy, &meta, &self.config)?;
        let handler = Arc::new(Handler::assemble(ty.clone(), strategy, bound, &meta));

        // Registered before finalization so recursive lookups of this type
        // terminate; finalization itself re-enters `resolve`.
        in_flight
            .borrow_mut()
            .building
            .insert(ty.clone(), handler.clone());
        let finalized = handler.finalize(self);
        in_flight.borrow_mut().building.remove(ty);
        finalized?;

        if handler.is_cacheable() {
            self.cached.write().insert(ty.clone(), handler.clone());
            in_flight.borrow_mut().committed.push(ty.clone());
            debug!(ty = %ty, "handler committed to permanent cache");
        }
        Ok(handler)
    }

    /// Drops every committed handler. Types resolve from scratch afterwards.
    pub fn flush(&self) {
        self.cached.write().clear();
    }

    /// Number of handlers in the permanent cache.
    pub fn size(&self) -> usize {
        self.cached.read().len()
    }
}
