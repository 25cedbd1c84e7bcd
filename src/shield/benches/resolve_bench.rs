//! Rule tree resolution benchmarks
//!
//! Measures resolution of wide and deep trees, with and without per-request
//! caching of the leaves.

use authz_shield::constructors::{and, chain, or, race, rule};
use authz_shield::{
    CachePolicy, Payload, RequestCache, RuleOptions, RuleRef, RuleResult, ShieldOptions,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn leaf(name: &str, cache: CachePolicy) -> RuleRef {
    rule(Some(name), RuleOptions::new().with_cache(cache), |payload| async move {
        Ok(RuleResult::from(payload.args["id"].as_u64().unwrap_or_default() % 7 != 3))
    })
}

/// `width` branches, each repeating the same `repeat` leaves
fn wide_tree(width: usize, repeat: usize, cache: CachePolicy) -> RuleRef {
    let leaves: Vec<RuleRef> = (0..repeat)
        .map(|i| leaf(&format!("leaf-{}", i), cache.clone()))
        .collect();

    and((0..width)
        .map(|i| match i % 3 {
            0 => or(leaves.clone()),
            1 => chain(leaves.clone()),
            _ => race(leaves.clone()),
        })
        .collect())
}

fn deep_tree(depth: usize) -> RuleRef {
    (0..depth).fold(leaf("root", CachePolicy::NoCache), |tree, i| {
        if i % 2 == 0 {
            and(vec![tree, leaf(&format!("level-{}", i), CachePolicy::NoCache)])
        } else {
            chain(vec![tree])
        }
    })
}

fn bench_cache_policies(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let options = ShieldOptions::default();
    let payload = Arc::new(Payload::default().with_args(json!({ "id": 42 })));

    let mut group = c.benchmark_group("wide_tree");

    for (label, cache) in [
        ("no_cache", CachePolicy::NoCache),
        ("strict", CachePolicy::Strict),
        ("contextual", CachePolicy::Contextual),
    ] {
        for width in [4, 16, 64] {
            let tree = wide_tree(width, 4, cache.clone());

            group.bench_with_input(BenchmarkId::new(label, width), &tree, |b, tree| {
                b.to_async(&rt).iter(|| async {
                    let request_cache = RequestCache::new();
                    black_box(
                        tree.resolve(&payload, &request_cache, &options)
                            .await
                            .unwrap(),
                    )
                });
            });
        }
    }

    group.finish();
}

fn bench_deep_tree(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let options = ShieldOptions::default();
    let payload = Arc::new(Payload::default().with_args(json!({ "id": 1 })));

    let mut group = c.benchmark_group("deep_tree");

    for depth in [8, 32, 128] {
        let tree = deep_tree(depth);

        group.bench_with_input(BenchmarkId::new("depth", depth), &tree, |b, tree| {
            b.to_async(&rt).iter(|| async {
                let request_cache = RequestCache::new();
                black_box(
                    tree.resolve(&payload, &request_cache, &options)
                        .await
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_default_hash(c: &mut Criterion) {
    let parent = json!({ "id": "post-1", "authorId": "user-9", "tags": ["a", "b", "c"] });
    let args = json!({ "first": 20, "after": "cursor-abc", "filter": { "status": "draft" } });

    c.bench_function("default_hash", |b| {
        b.iter(|| authz_shield::options::default_hash(black_box(&parent), black_box(&args)))
    });
}

criterion_group!(benches, bench_cache_policies, bench_deep_tree, bench_default_hash);
criterion_main!(benches);
