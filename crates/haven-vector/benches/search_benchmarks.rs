//! Benchmarks for exhaustive versus IVF-partitioned vector search.
//!
//! Uses 2,000 hash-embedded messages at 384 dimensions by default. Set
//! `BENCH_FULL_SCALE=1` to run with 50,000 entries.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use haven_vector::collection::{CollectionSchema, ScalarFields};
use haven_vector::embedding::{EmbeddingService, HashEmbedding};
use haven_vector::ivf::IvfParams;
use haven_vector::store::{IvfVectorStore, VectorStore};

const CI_ENTRY_COUNT: usize = 2_000;
const FULL_SCALE_ENTRY_COUNT: usize = 50_000;
const DIMENSIONS: usize = 384;

fn entry_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_ENTRY_COUNT
    } else {
        CI_ENTRY_COUNT
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}

/// Populate a store with `count` entries, training the IVF index up front
/// when `trained` is set.
fn build_store(rt: &tokio::runtime::Runtime, count: usize, trained: bool) -> IvfVectorStore {
    let store = IvfVectorStore::new();
    let embedder = HashEmbedding::new(DIMENSIONS);
    let params = IvfParams {
        nlist: 64,
        nprobe: 4,
        train_threshold: usize::MAX,
        iterations: 5,
    };

    rt.block_on(async {
        store
            .ensure_collection(CollectionSchema::new("bench", DIMENSIONS).with_ivf(params))
            .await
            .expect("create collection");
        for i in 0..count {
            let text = format!("journal entry number {} about sleep, mood and exercise", i);
            let vector = embedder.embed(&text).await.expect("embed");
            store
                .insert("bench", i as i64, vector, ScalarFields::new())
                .await
                .expect("insert");
        }
    });

    if trained {
        store.train_now("bench").expect("train");
    }
    store
}

fn bench_search(c: &mut Criterion) {
    let rt = runtime();
    let count = entry_count();
    let embedder = HashEmbedding::new(DIMENSIONS);
    let query = rt
        .block_on(embedder.embed("how did I sleep last week"))
        .expect("embed query");

    let mut group = c.benchmark_group("vector_search");
    group.measurement_time(Duration::from_secs(10));

    let flat = build_store(&rt, count, false);
    group.bench_function("exhaustive_top5", |b| {
        b.iter(|| rt.block_on(flat.search("bench", &query, 5)).expect("search"))
    });

    let ivf = build_store(&rt, count, true);
    group.bench_function("ivf_nprobe4_top5", |b| {
        b.iter(|| rt.block_on(ivf.search("bench", &query, 5)).expect("search"))
    });

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
