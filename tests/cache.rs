use bindery::{
    BindConfig, BindError, BindResult, CreatorCandidate, MetadataProvider, MetadataRegistry,
    PropertySpec, ResolutionCache, TypeDescriptor, TypeMetadata,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn ty(name: &str) -> TypeDescriptor {
    TypeDescriptor::of(name)
}

fn leaf(name: &str) -> TypeMetadata {
    TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor(format!("{}()", name)))
        .with_property(PropertySpec::new("name", TypeDescriptor::text()))
}

fn cache_for(registrations: Vec<(TypeDescriptor, TypeMetadata)>) -> ResolutionCache {
    let mut registry = MetadataRegistry::new();
    for (t, meta) in registrations {
        registry.register(t, meta);
    }
    ResolutionCache::new(Arc::new(registry), BindConfig::new())
}

/// Counts how many times the provider was asked to describe a type.
struct CountingProvider {
    inner: MetadataRegistry,
    describes: AtomicUsize,
}

impl CountingProvider {
    fn new(inner: MetadataRegistry) -> Self {
        Self {
            inner,
            describes: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }
}

impl MetadataProvider for CountingProvider {
    fn describe(&self, ty: &TypeDescriptor) -> BindResult<TypeMetadata> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.inner.describe(ty)
    }
}

#[test]
fn repeated_resolution_returns_the_same_handler() {
    let cache = cache_for(vec![(ty("Leaf"), leaf("Leaf"))]);
    let first = cache.resolve(&ty("Leaf")).unwrap();
    let second = cache.resolve(&ty("Leaf")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.size(), 1);
}

#[test]
fn metadata_is_consulted_once_per_cached_type() {
    let mut registry = MetadataRegistry::new();
    registry.register(ty("Leaf"), leaf("Leaf"));
    let provider = Arc::new(CountingProvider::new(registry));
    let cache = ResolutionCache::new(provider.clone(), BindConfig::new());

    cache.resolve(&ty("Leaf")).unwrap();
    cache.resolve(&ty("Leaf")).unwrap();
    cache.resolve(&ty("Leaf")).unwrap();
    assert_eq!(provider.count(), 1);
}

#[test]
fn flush_discards_committed_handlers() {
    let mut registry = MetadataRegistry::new();
    registry.register(ty("Leaf"), leaf("Leaf"));
    let provider = Arc::new(CountingProvider::new(registry));
    let cache = ResolutionCache::new(provider.clone(), BindConfig::new());

    cache.resolve(&ty("Leaf")).unwrap();
    assert_eq!(cache.size(), 1);

    cache.flush();
    assert_eq!(cache.size(), 0);

    cache.resolve(&ty("Leaf")).unwrap();
    assert_eq!(provider.count(), 2);
    assert_eq!(cache.size(), 1);
}

#[test]
fn self_referential_type_resolves_and_builds() {
    let node = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("Node()"))
        .with_property(PropertySpec::new("value", TypeDescriptor::int()))
        .with_property(PropertySpec::new("next", ty("Node")));
    let cache = cache_for(vec![(ty("Node"), node)]);

    let handler = cache.resolve(&ty("Node")).unwrap();
    assert_eq!(cache.size(), 1);

    let built = handler
        .build(&json!({"value": 1, "next": {"value": 2}}))
        .unwrap();
    assert_eq!(built, json!({"value": 1, "next": {"value": 2}}));
}

#[test]
fn mutually_recursive_types_resolve_in_either_order() {
    let a = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("A()"))
        .with_property(PropertySpec::new("b", ty("B")));
    let b = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("B()"))
        .with_property(PropertySpec::new("a", ty("A")));

    let cache = cache_for(vec![(ty("A"), a.clone()), (ty("B"), b.clone())]);
    cache.resolve(&ty("A")).unwrap();
    assert_eq!(cache.size(), 2);

    let cache = cache_for(vec![(ty("A"), a), (ty("B"), b)]);
    cache.resolve(&ty("B")).unwrap();
    assert_eq!(cache.size(), 2);

    let handler = cache.resolve(&ty("A")).unwrap();
    let built = handler.build(&json!({"b": {"a": {"b": null}}})).unwrap();
    assert_eq!(built, json!({"b": {"a": {"b": null}}}));
}

#[test]
fn concurrent_resolution_converges_on_one_handler() {
    let node = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("Node()"))
        .with_property(PropertySpec::new("next", ty("Node")));
    let cache = Arc::new(cache_for(vec![(ty("Node"), node)]));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.resolve(&ty("Node")).unwrap()
            })
        })
        .collect();

    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for handler in &resolved[1..] {
        assert!(Arc::ptr_eq(&resolved[0], handler));
    }
    assert_eq!(cache.size(), 1);
}

#[test]
fn concurrent_mixed_type_resolution_with_cycles_completes() {
    let a = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("A()"))
        .with_property(PropertySpec::new("b", ty("B")));
    let b = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("B()"))
        .with_property(PropertySpec::new("a", ty("A")));
    let cache = Arc::new(cache_for(vec![
        (ty("A"), a),
        (ty("B"), b),
        (ty("Leaf"), leaf("Leaf")),
    ]));

    // Misses for distinct types all contend on the one construction
    // section; the cyclic pair must not deadlock against the unrelated
    // type's resolution.
    let names = ["A", "B", "Leaf"];
    let threads = 9;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            let name = names[i % names.len()];
            thread::spawn(move || {
                barrier.wait();
                cache.resolve(&ty(name)).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.size(), 3);
    for name in names {
        let first = cache.resolve(&ty(name)).unwrap();
        let second = cache.resolve(&ty(name)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
    let built = cache
        .resolve(&ty("A"))
        .unwrap()
        .build(&json!({"b": {"a": null}}))
        .unwrap();
    assert_eq!(built, json!({"b": {"a": null}}));
}

#[test]
fn dependents_committed_during_a_failed_resolution_are_rolled_back() {
    // Resolving A commits B while A's finalization is still running, then
    // fails on the unregistered type. B must not survive in the cache with
    // its slot for A never filled in.
    let a = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("A()"))
        .with_property(PropertySpec::new("b", ty("B")))
        .with_property(PropertySpec::new("child", ty("Missing")));
    let b = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("B()"))
        .with_property(PropertySpec::new("a", ty("A")));
    let cache = cache_for(vec![(ty("A"), a), (ty("B"), b)]);

    let err = cache.resolve(&ty("A")).unwrap_err();
    assert!(matches!(err, BindError::UnknownType { .. }));
    assert_eq!(cache.size(), 0);

    // A fresh resolution of B reconstructs it and reports the real failure
    // instead of returning a cached handler that cannot build.
    let err = cache.resolve(&ty("B")).unwrap_err();
    assert!(matches!(err, BindError::UnknownType { .. }));
}

#[test]
fn build_override_bypasses_the_cache() {
    let cache = cache_for(vec![(ty("Leaf"), leaf("Leaf"))]);

    let with_override = ty("Leaf").with_override(|node| Ok(json!({"custom": node.clone()})));
    let handler = cache.resolve(&with_override).unwrap();
    assert_eq!(
        handler.build(&json!(1)).unwrap(),
        json!({"custom": 1})
    );
    // Nothing was committed, and the plain descriptor still resolves the
    // ordinary way.
    assert_eq!(cache.size(), 0);

    let plain = cache.resolve(&ty("Leaf")).unwrap();
    assert_eq!(plain.build(&json!({"name": "n"})).unwrap(), json!({"name": "n"}));
    assert_eq!(cache.size(), 1);

    let again = cache.resolve(&with_override).unwrap();
    assert!(!Arc::ptr_eq(&plain, &again));
}

#[test]
fn non_shareable_types_are_rebuilt_per_resolution() {
    let mut registry = MetadataRegistry::new();
    registry.register(ty("Scratch"), leaf("Scratch").not_shareable());
    let provider = Arc::new(CountingProvider::new(registry));
    let cache = ResolutionCache::new(provider.clone(), BindConfig::new());

    let first = cache.resolve(&ty("Scratch")).unwrap();
    let second = cache.resolve(&ty("Scratch")).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(cache.size(), 0);
    assert_eq!(provider.count(), 2);
}

#[test]
fn unresolvable_nested_type_fails_the_parent_resolution() {
    let parent = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("Parent()"))
        .with_property(PropertySpec::new("child", ty("Missing")));
    let cache = cache_for(vec![(ty("Parent"), parent)]);

    let err = cache.resolve(&ty("Parent")).unwrap_err();
    assert!(matches!(err, BindError::UnknownType { .. }));
    assert_eq!(cache.size(), 0);

    // Failure is stable: the in-flight registry was cleared, so a retry
    // reports the same error instead of observing leftovers.
    let err = cache.resolve(&ty("Parent")).unwrap_err();
    assert!(matches!(err, BindError::UnknownType { .. }));
}

#[test]
fn failed_resolution_does_not_poison_other_types() {
    let parent = TypeMetadata::new()
        .with_constructor(CreatorCandidate::constructor("Parent()"))
        .with_property(PropertySpec::new("child", ty("Missing")));
    let cache = cache_for(vec![(ty("Parent"), parent), (ty("Leaf"), leaf("Leaf"))]);

    assert!(cache.resolve(&ty("Parent")).is_err());
    let handler = cache.resolve(&ty("Leaf")).unwrap();
    assert_eq!(handler.build(&json!({"name": "ok"})).unwrap(), json!({"name": "ok"}));
    assert_eq!(cache.size(), 1);
}

#[test]
fn generic_descriptors_cache_independently() {
    let list_of = |inner: &str| TypeDescriptor::with_args("List", vec![ty(inner)]);
    let mut registry = MetadataRegistry::new();
    registry.register(list_of("A"), leaf("List"));
    registry.register(list_of("B"), leaf("List"));
    let cache = ResolutionCache::new(Arc::new(registry), BindConfig::new());

    let a = cache.resolve(&list_of("A")).unwrap();
    let b = cache.resolve(&list_of("B")).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.size(), 2);
}
