//! Deserializer construction and resolution for dynamically described types.
//!
//! `bindery` turns declarative type metadata (constructor and factory
//! candidates, setter/field properties, policy flags) into reusable
//! per-type value-building handlers, and memoizes them in a
//! concurrency-safe resolution cache.
//!
//! - **Creator selection** — four deterministic passes pick exactly one
//!   instantiation strategy per type: default, scalar-delegating,
//!   generic-delegating, or properties-based. Contradictory metadata fails
//!   fast with the offending creator signature and parameter index.
//! - **Property binding** — reconciles creator parameters with discovered
//!   properties, honoring ignore/include lists, back references, injected
//!   values, the capture-remaining fallback, and object identity.
//! - **Resolution cache** — lock-free-ish fast path for hits, a single
//!   exclusive construction section for misses, and an in-flight registry
//!   that terminates cyclic type graphs.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use bindery::{
//!     BindConfig, CreatorCandidate, CreatorMode, MetadataRegistry, ParamSpec,
//!     ResolutionCache, TypeDescriptor, TypeMetadata,
//! };
//! use serde_json::json;
//!
//! let mut registry = MetadataRegistry::new();
//! registry.register(
//!     TypeDescriptor::of("Point"),
//!     TypeMetadata::new().with_constructor(
//!         CreatorCandidate::constructor("Point(int,int)")
//!             .mode(CreatorMode::Properties)
//!             .param(ParamSpec::of(TypeDescriptor::int()).named("x"))
//!             .param(ParamSpec::of(TypeDescriptor::int()).named("y")),
//!     ),
//! );
//!
//! let cache = ResolutionCache::new(Arc::new(registry), BindConfig::new());
//! let handler = cache.resolve(&TypeDescriptor::of("Point")).unwrap();
//! let point = handler.build(&json!({"x": 3, "y": 4})).unwrap();
//! assert_eq!(point, json!({"x": 3, "y": 4}));
//!
//! // Identical descriptors resolve to the same memoized handler.
//! let again = cache.resolve(&TypeDescriptor::of("Point")).unwrap();
//! assert!(Arc::ptr_eq(&handler, &again));
//! ```
//!
//! # Instances are trees
//!
//! The engine builds [`serde_json::Value`] trees through caller-supplied
//! `invoke`/`apply` closures; it never introspects concrete Rust types.
//! Metadata providers decide what those closures construct, which keeps the
//! selection and caching machinery independent of any particular object
//! model.

#![warn(missing_docs)]

mod binder;
mod cache;
mod config;
mod creator;
mod descriptor;
mod error;
mod extension;
mod handler;
mod metadata;

pub use binder::{bind_properties, BoundProperty, BoundPropertySet, ObjectIdReader};
pub use cache::ResolutionCache;
pub use config::{BindConfig, SingleArgPolicy};
pub use creator::{
    select_instantiation, CreatorParam, Instantiation, InstantiationKind, ScalarCreators,
};
pub use descriptor::{OverrideFn, ScalarKind, TypeDescriptor};
pub use error::{BindError, BindResult};
pub use extension::{InstantiatorProvider, StrategyModifier};
pub use handler::{Handler, InjectableValues};
pub use metadata::{
    AnyApplyFn, AnySetterSpec, ApplyFn, CreatorCandidate, CreatorKind, CreatorMode, InvokeFn,
    MetadataProvider, MetadataRegistry, ObjectIdSpec, ParamSpec, PropertySpec, TypeMetadata,
};
