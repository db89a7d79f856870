use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;

use bindery::{
    BindConfig, CreatorCandidate, CreatorMode, MetadataRegistry, ParamSpec, PropertySpec,
    ResolutionCache, TypeDescriptor, TypeMetadata,
};

fn ty(name: &str) -> TypeDescriptor {
    TypeDescriptor::of(name)
}

fn point_meta() -> TypeMetadata {
    TypeMetadata::new().with_constructor(
        CreatorCandidate::constructor("Point(int,int)")
            .mode(CreatorMode::Properties)
            .param(ParamSpec::of(TypeDescriptor::int()).named("x"))
            .param(ParamSpec::of(TypeDescriptor::int()).named("y")),
    )
}

fn registry() -> MetadataRegistry {
    let mut registry = MetadataRegistry::new();
    registry.register(ty("Point"), point_meta());
    registry.register(
        ty("Node"),
        TypeMetadata::new()
            .with_constructor(CreatorCandidate::constructor("Node()"))
            .with_property(PropertySpec::new("value", TypeDescriptor::int()))
            .with_property(PropertySpec::new("point", ty("Point")))
            .with_property(PropertySpec::new("next", ty("Node"))),
    );
    registry
}

fn bench_resolve_hit(c: &mut Criterion) {
    let cache = ResolutionCache::new(Arc::new(registry()), BindConfig::new());
    // Prime the cache
    let _ = cache.resolve(&ty("Point")).unwrap();

    c.bench_function("resolve_hit", |b| {
        b.iter(|| {
            let handler = cache.resolve(&ty("Point")).unwrap();
            black_box(&handler);
        })
    });
}

fn bench_resolve_cold(c: &mut Criterion) {
    c.bench_function("resolve_cold_cyclic", |b| {
        b.iter_batched(
            || ResolutionCache::new(Arc::new(registry()), BindConfig::new()),
            |cache| {
                let handler = cache.resolve(&ty("Node")).unwrap();
                black_box(&handler);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_build(c: &mut Criterion) {
    let cache = ResolutionCache::new(Arc::new(registry()), BindConfig::new());
    let point = cache.resolve(&ty("Point")).unwrap();
    let node = cache.resolve(&ty("Node")).unwrap();

    let mut group = c.benchmark_group("build");

    let flat = json!({"x": 1, "y": 2});
    group.bench_function("properties_creator", |b| {
        b.iter(|| {
            let v = point.build(&flat).unwrap();
            black_box(v);
        })
    });

    let nested = json!({
        "value": 1,
        "point": {"x": 1, "y": 2},
        "next": {"value": 2, "next": {"value": 3}}
    });
    group.bench_function("nested_recursive", |b| {
        b.iter(|| {
            let v = node.build(&nested).unwrap();
            black_box(v);
        })
    });

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let cache = Arc::new(ResolutionCache::new(Arc::new(registry()), BindConfig::new()));
    let _ = cache.resolve(&ty("Point")).unwrap();

    let mut group = c.benchmark_group("contention");
    for &thread_count in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("resolve_hit_threads", thread_count),
            &thread_count,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    std::thread::scope(|s| {
                        for _ in 0..threads {
                            let cache = &cache;
                            s.spawn(move || {
                                for _ in 0..iters / threads as u64 {
                                    let handler = cache.resolve(&ty("Point")).unwrap();
                                    black_box(&handler);
                                }
                            });
                        }
                    });
                    start.elapsed()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_resolve_hit,
    bench_resolve_cold,
    bench_build,
    bench_contention
);
criterion_main!(benches);
