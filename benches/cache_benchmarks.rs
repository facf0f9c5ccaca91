use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rs_catalog::cache::{CacheAside, CacheKey, CacheStore, Operation};
use rs_catalog::service::CatalogService;
use rs_catalog::storage::{Collection, CollectionRegistry, CollectionStore, MemStore};
use rs_catalog::values::Document;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn make_game(i: usize) -> Document {
    let value = json!({
        "_id": format!("g{}", i),
        "title": format!("Game {}", i),
        "category": ["arcade", "puzzle", "board", "racing"][i % 4],
        "position": i,
        "desc": "A game",
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn make_service(size: usize) -> CatalogService {
    let games = MemStore::new();
    for i in 0..size {
        games.insert(make_game(i)).unwrap();
    }
    let registry = CollectionRegistry::new()
        .register(Collection::Games, Arc::new(games))
        .register(Collection::Categories, Arc::new(MemStore::new()));
    CatalogService::new(CacheAside::new(Arc::new(CacheStore::with_defaults())), registry)
}

fn bench_store_get(c: &mut Criterion) {
    let store = CacheStore::with_defaults();
    for i in 0..1000 {
        store.set(format!("key{}", i), json!({"n": i}), None).unwrap();
    }

    c.bench_function("store_get_hit", |b| {
        b.iter(|| black_box(store.get::<Value>(black_box("key500"))));
    });
    c.bench_function("store_get_miss", |b| {
        b.iter(|| black_box(store.get::<Value>(black_box("absent"))));
    });
}

fn bench_key_derivation(c: &mut Criterion) {
    let filter = json!({"category": "arcade", "title": {"$regex": "snake", "$options": "i"}});
    c.bench_function("find_key", |b| {
        b.iter(|| CacheKey::with_params(Operation::Find, Collection::Games, black_box(&filter)).unwrap());
    });
}

fn bench_cached_vs_uncached(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("find_games");

    for size in [100, 1000].iter() {
        let service = make_service(*size);
        let filter = json!({"category": "arcade"});

        group.bench_with_input(BenchmarkId::new("cached", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(service.find(Collection::Games, &filter, true).await.unwrap());
            });
        });

        group.bench_with_input(BenchmarkId::new("bypass", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                black_box(service.find(Collection::Games, &filter, false).await.unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_store_get,
    bench_key_derivation,
    bench_cached_vs_uncached
);
criterion_main!(benches);
