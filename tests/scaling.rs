//! Scaling tests with synthetic 10k+ product catalogs.
//!
//! Measures key operations:
//! - Population through the mutation service
//! - Restart/replay from the log
//! - Compaction
//! - Fan-out to many observers
//! - Bootstrap of sync sessions against a busy writer

use catalog_sync::{
    FanoutChannel, FileStore, MutationService, ObserverConfig, ProductDraft, RecordStore,
    StoreConfig, SyncConfig, SyncSession, SyncStep,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PRODUCT_COUNT: u64 = 10_000;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("catalog"),
        create_if_missing: true,
        sync_interval: 1000,
        ..Default::default()
    }
}

fn draft(i: u64) -> ProductDraft {
    ProductDraft {
        name: Some(format!("Product {}", i)),
        price: Some((i % 1000) as f64),
        category: Some(["Electronics", "Books", "Garden"][(i % 3) as usize].into()),
        rating: Some((i % 11) as f64 / 2.0),
        warranty_years: Some((i % 5) as i64),
        available: Some(i % 2 == 0),
    }
}

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report(&self) {
        println!("  {} took {:.2}ms", self.name, self.elapsed_ms());
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        let per_sec = if ms > 0.0 { count as f64 / (ms / 1000.0) } else { 0.0 };
        println!(
            "  {} took {:.2}ms ({} items, {:.0} items/sec)",
            self.name, ms, count, per_sec
        );
    }
}

// =============================================================================
// Test: 10k products, write, reopen, compact
// =============================================================================

#[test]
fn test_scaling_10k_products() {
    println!("\n=== 10k Products ===");

    let dir = TempDir::new().unwrap();
    let channel = Arc::new(FanoutChannel::new());
    let service = MutationService::new(FileStore::create(test_config(&dir)).unwrap(), channel);

    let timer = Timer::new("Create 10k products");
    let mut ids = Vec::with_capacity(PRODUCT_COUNT as usize);
    for i in 0..PRODUCT_COUNT {
        ids.push(service.create(draft(i)).unwrap().id);
    }
    timer.report_with_count(PRODUCT_COUNT as usize);

    let timer = Timer::new("Delete every 4th product");
    for id in ids.iter().step_by(4) {
        service.delete(&id.to_hex()).unwrap();
    }
    timer.report();

    let timer = Timer::new("List");
    let snapshot = service.list().unwrap();
    timer.report_with_count(snapshot.records.len());
    assert_eq!(snapshot.records.len(), 7_500);

    let before = service.store().log_size();
    let timer = Timer::new("Compact");
    service.store().compact().unwrap();
    timer.report();
    assert!(service.store().log_size() < before);

    drop(service);

    let timer = Timer::new("Reopen store (replay log)");
    let store = FileStore::open(test_config(&dir)).unwrap();
    timer.report();
    assert_eq!(store.len(), 7_500);
    assert_eq!(store.head(), snapshot.as_of);

    println!("  ✓ 10k product test passed");
}

// =============================================================================
// Test: Fan-out to many observers
// =============================================================================

#[test]
fn test_scaling_observers() {
    println!("\n=== Fan-out to 100 Observers ===");

    let dir = TempDir::new().unwrap();
    let channel = Arc::new(FanoutChannel::new());
    let service = MutationService::new(FileStore::create(test_config(&dir)).unwrap(), channel.clone());

    let observers: Vec<_> = (0..100)
        .map(|_| channel.connect(ObserverConfig { buffer_size: 2_000 }))
        .collect();

    let timer = Timer::new("1000 creates with 100 observers");
    for i in 0..1_000 {
        service.create(draft(i)).unwrap();
    }
    timer.report_with_count(100_000);

    assert_eq!(channel.observer_count(), 100);
    for handle in &observers {
        assert_eq!(handle.drain().len(), 1_000);
    }

    println!("  ✓ Observer fan-out test passed");
}

// =============================================================================
// Test: Sessions bootstrapping while a writer runs
// =============================================================================

#[test]
fn test_scaling_sessions_under_load() {
    println!("\n=== Sessions Under Load ===");

    let dir = TempDir::new().unwrap();
    let channel = Arc::new(FanoutChannel::new());
    let service = Arc::new(MutationService::new(
        FileStore::create(test_config(&dir)).unwrap(),
        channel.clone(),
    ));

    let writer = {
        let service = service.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                let product = service.create(draft(i)).unwrap();
                if i % 5 == 0 {
                    service.delete(&product.id.to_hex()).unwrap();
                }
            }
        })
    };

    let timer = Timer::new("Bootstrap 8 sessions during writes");
    let readers: Vec<_> = (0..8)
        .map(|n| {
            let service = service.clone();
            let channel = channel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(n * 5));
                let config = SyncConfig {
                    observer: ObserverConfig { buffer_size: 8_192 },
                    resync_interval: None,
                };
                let mut session = SyncSession::bootstrap(service, channel, config).unwrap();
                while session.poll(Duration::from_millis(200)).unwrap() != SyncStep::Idle {}
                session
            })
        })
        .collect();

    writer.join().unwrap();
    let mut sessions: Vec<_> = readers.into_iter().map(|r| r.join().unwrap()).collect();
    timer.report();

    let expected = service.list().unwrap().records;
    for session in &mut sessions {
        while session.poll(Duration::from_millis(50)).unwrap() != SyncStep::Idle {}
        let local: Vec<_> = session.catalog().records().cloned().collect();
        assert_eq!(local.len(), expected.len());
        assert_eq!(local, expected);
    }

    println!("  ✓ Sessions under load test passed");
}
