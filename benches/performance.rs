//! Performance benchmarks for the catalog.

use std::sync::Arc;

use catalog_sync::{
    FanoutChannel, FileStore, MemoryStore, MutationService, ObserverConfig, ProductDraft,
    StoreConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

fn draft(i: u64) -> ProductDraft {
    ProductDraft {
        name: Some(format!("Product {}", i)),
        price: Some(10.0 + i as f64),
        category: Some("Bench".into()),
        rating: Some((i % 7) as f64),
        warranty_years: Some(1),
        available: None,
    }
}

fn create_file_store(dir: &TempDir, sync_interval: u64) -> FileStore {
    FileStore::create(StoreConfig {
        path: dir.path().join("catalog"),
        create_if_missing: true,
        sync_interval,
        ..Default::default()
    })
    .unwrap()
}

/// Benchmark create with varying observer counts
fn bench_create_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_fanout");

    for observers in [0, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("observers", observers),
            &observers,
            |b, &count| {
                let channel = Arc::new(FanoutChannel::new());
                let service = MutationService::new(MemoryStore::new(), channel.clone());
                let handles: Vec<_> = (0..count)
                    .map(|_| channel.connect(ObserverConfig::default()))
                    .collect();

                let mut i = 0;
                b.iter(|| {
                    i += 1;
                    black_box(service.create(draft(i)).unwrap());
                    // Keep queues from overflowing
                    for handle in &handles {
                        handle.drain();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark durable create with varying fsync intervals
fn bench_file_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_create");
    group.sample_size(20);

    for sync_interval in [1, 100] {
        group.bench_with_input(
            BenchmarkId::new("sync_interval", sync_interval),
            &sync_interval,
            |b, &interval| {
                let dir = TempDir::new().unwrap();
                let channel = Arc::new(FanoutChannel::new());
                let service = MutationService::new(create_file_store(&dir, interval), channel);

                let mut i = 0;
                b.iter(|| {
                    i += 1;
                    black_box(service.create(draft(i)).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark listing at different catalog sizes
fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");

    for size in [100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("records", size), &size, |b, &size| {
            let channel = Arc::new(FanoutChannel::new());
            let service = MutationService::new(MemoryStore::new(), channel);
            for i in 0..size {
                service.create(draft(i)).unwrap();
            }

            b.iter(|| {
                black_box(service.list().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark replaying a log on open
fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("reopen");
    group.sample_size(10);

    for size in [1000, 10000] {
        group.bench_with_input(BenchmarkId::new("records", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let config = StoreConfig {
                path: dir.path().join("catalog"),
                sync_interval: 1000,
                ..Default::default()
            };
            {
                let channel = Arc::new(FanoutChannel::new());
                let service = MutationService::new(FileStore::create(config.clone()).unwrap(), channel);
                for i in 0..size {
                    service.create(draft(i)).unwrap();
                }
            }

            b.iter(|| {
                black_box(FileStore::open(config.clone()).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_fanout,
    bench_file_create,
    bench_list,
    bench_reopen
);
criterion_main!(benches);
