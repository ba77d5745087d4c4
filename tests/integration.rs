//! Integration tests for the catalog: store, service, channel and sync
//! working together.

use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use catalog_sync::{
    Broadcaster, ChannelConfig, ChannelEvent, Delivery, EventEnvelope, FanoutChannel, FileStore,
    MutationService, ObserverConfig, Product, ProductDraft, ProductId, RecordStore, Sequence,
    StoreConfig, SyncConfig, SyncSession, SyncStep,
};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

type Service = MutationService<FileStore, Arc<FanoutChannel>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn test_store(dir: &TempDir) -> FileStore {
    FileStore::create(StoreConfig {
        path: dir.path().join("catalog"),
        create_if_missing: true,
        sync_interval: 1,
        ..Default::default()
    })
    .unwrap()
}

fn test_service(dir: &TempDir) -> (Arc<Service>, Arc<FanoutChannel>) {
    init_tracing();
    let channel = Arc::new(FanoutChannel::new());
    let service = Arc::new(MutationService::new(test_store(dir), channel.clone()));
    (service, channel)
}

fn draft(value: serde_json::Value) -> ProductDraft {
    serde_json::from_value(value).unwrap()
}

fn phone() -> ProductDraft {
    draft(json!({
        "name": "Phone",
        "price": 499,
        "type": "Electronics",
        "rating": 7,
        "warranty_years": 2
    }))
}

fn events(handle: &catalog_sync::ObserverHandle) -> Vec<ChannelEvent> {
    handle
        .drain()
        .into_iter()
        .filter_map(|d| match d {
            Delivery::Event { envelope } => Some(envelope.event),
            _ => None,
        })
        .collect()
}

// --- Mutation Scenarios ---

#[test]
fn test_create_clamps_rating_and_broadcasts() {
    let dir = TempDir::new().unwrap();
    let (service, channel) = test_service(&dir);
    let observer = channel.connect(ObserverConfig::default());

    let product = service.create(phone()).unwrap();
    assert_eq!(product.rating, 5.0);
    assert_eq!(product.revision, 1);

    let received = events(&observer);
    assert_eq!(received, vec![ChannelEvent::ProductAdded(product.clone())]);

    // Listing shows the same field values the observer saw
    let snapshot = service.list().unwrap();
    assert_eq!(snapshot.as_of, Sequence(1));
    assert_eq!(snapshot.records.len(), 1);
    let view = &snapshot.records[0];
    assert_eq!(view.id, product.id);
    assert_eq!(view.name.as_deref(), Some("Phone"));
    assert_eq!(view.price, Some(499.0));
    assert_eq!(view.category.as_deref(), Some("Electronics"));
    assert_eq!(view.rating, Some(5.0));
    assert_eq!(view.warranty_years, Some(2));
    assert_eq!(view.available, Some(true));
}

#[test]
fn test_delete_twice() {
    let dir = TempDir::new().unwrap();
    let (service, channel) = test_service(&dir);
    let product = service.create(phone()).unwrap();
    let observer = channel.connect(ObserverConfig::default());
    let id = product.id.to_hex();

    assert_eq!(service.delete(&id).unwrap(), product.id);
    assert!(matches!(
        service.delete(&id),
        Err(catalog_sync::CatalogError::NotFound(_))
    ));

    assert_eq!(events(&observer), vec![ChannelEvent::ProductDeleted(product.id)]);
}

#[test]
fn test_update_broadcasts_full_record() {
    let dir = TempDir::new().unwrap();
    let (service, channel) = test_service(&dir);
    let product = service.create(phone()).unwrap();
    let observer = channel.connect(ObserverConfig::default());

    let updated = service
        .update(&product.id.to_hex(), draft(json!({ "price": 399 })))
        .unwrap();
    assert_eq!(updated.price, 399.0);
    assert_eq!(updated.name, "Phone");
    assert_eq!(updated.revision, 2);

    assert_eq!(events(&observer), vec![ChannelEvent::ProductUpdated(updated)]);
}

#[test]
fn test_concurrent_updates_are_ordered() {
    let dir = TempDir::new().unwrap();
    let (service, channel) = test_service(&dir);
    let product = service.create(phone()).unwrap();
    let observer = channel.connect(ObserverConfig::default());
    let id = product.id.to_hex();

    let handles: Vec<_> = [json!({ "price": 100 }), json!({ "name": "Phone X" })]
        .into_iter()
        .map(|body| {
            let service = service.clone();
            let id = id.clone();
            thread::spawn(move || service.update(&id, draft(body)).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Both merges landed
    let stored = service.get(&id).unwrap();
    assert_eq!(stored.price, 100.0);
    assert_eq!(stored.name, "Phone X");
    assert_eq!(stored.revision, 3);

    // Two broadcasts, each the canonical record at its point in the order
    let mut received: Vec<_> = events(&observer)
        .into_iter()
        .map(|e| match e {
            ChannelEvent::ProductUpdated(p) => p,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(received.len(), 2);
    received.sort_by_key(|p| p.revision);
    assert_eq!(received[0].revision, 2);
    assert_eq!(received[1], stored);
    for result in results {
        assert!(received.contains(&result));
    }
}

// --- Persistence ---

#[test]
fn test_catalog_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().join("catalog"),
        ..Default::default()
    };

    let (kept, removed) = {
        let channel = Arc::new(FanoutChannel::new());
        let service = MutationService::new(FileStore::create(config.clone()).unwrap(), channel);
        let kept = service.create(phone()).unwrap();
        let removed = service.create(phone()).unwrap();
        service.delete(&removed.id.to_hex()).unwrap();
        (kept, removed)
    };

    let store = FileStore::open(config).unwrap();
    assert_eq!(store.head(), Sequence(3));
    assert_eq!(store.get(kept.id).unwrap(), Some(kept));
    assert_eq!(store.get(removed.id).unwrap(), None);
}

#[test]
fn test_ids_not_reused_after_compaction() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().join("catalog"),
        ..Default::default()
    };

    let retired = {
        let store = FileStore::create(config.clone()).unwrap();
        let channel = Arc::new(FanoutChannel::new());
        let service = MutationService::new(store, channel);
        let last = service.create(phone()).unwrap();
        service.delete(&last.id.to_hex()).unwrap();
        service.store().compact().unwrap();
        last.id
    };

    let store = FileStore::open(config).unwrap();
    let channel = Arc::new(FanoutChannel::new());
    let service = MutationService::new(store, channel);
    let fresh = service.create(phone()).unwrap();
    assert_ne!(fresh.id, retired);
    assert!(fresh.id.counter() > retired.counter());
}

// --- Synchronization ---

#[test]
fn test_session_converges_with_writer() {
    let dir = TempDir::new().unwrap();
    let (service, channel) = test_service(&dir);
    for _ in 0..5 {
        service.create(phone()).unwrap();
    }

    let mut session = SyncSession::bootstrap(
        service.clone(),
        channel.clone(),
        SyncConfig {
            resync_interval: None,
            ..Default::default()
        },
    )
    .unwrap();

    let writer = {
        let service = service.clone();
        thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..20 {
                let product = service.create(phone()).unwrap();
                if i % 3 == 0 {
                    service.delete(&product.id.to_hex()).unwrap();
                } else {
                    service
                        .update(&product.id.to_hex(), draft(json!({ "price": i })))
                        .unwrap();
                }
                ids.push(product.id);
            }
            ids
        })
    };
    writer.join().unwrap();

    while session.poll(Duration::from_millis(50)).unwrap() != SyncStep::Idle {}

    let expected = service.list().unwrap();
    let local: Vec<_> = session.catalog().records().cloned().collect();
    assert_eq!(local, expected.records);
}

#[test]
fn test_session_recovers_after_buffer_overflow() {
    let dir = TempDir::new().unwrap();
    let channel = Arc::new(FanoutChannel::with_config(ChannelConfig { replay_capacity: 4 }));
    let service = Arc::new(MutationService::new(test_store(&dir), channel.clone()));

    let mut session = SyncSession::bootstrap(
        service.clone(),
        channel.clone(),
        SyncConfig {
            observer: ObserverConfig { buffer_size: 4 },
            resync_interval: None,
        },
    )
    .unwrap();
    assert_eq!(
        session.poll(Duration::from_millis(50)).unwrap(),
        SyncStep::CaughtUp
    );

    // Overrun the session's queue so the channel drops it
    for _ in 0..10 {
        service.create(phone()).unwrap();
    }
    assert_eq!(channel.observer_count(), 0);

    while session.poll(Duration::from_millis(50)).unwrap() != SyncStep::Idle {}
    assert_eq!(session.catalog().len(), 10);
    assert_eq!(channel.observer_count(), 1);
}

/// Forwards to the channel. On the first `productAdded` it starts a rename of
/// that product on another thread and gives it time to run before forwarding.
struct RenameOnFirstAdd {
    channel: Arc<FanoutChannel>,
    service: OnceLock<Weak<MutationService<FileStore, Arc<RenameOnFirstAdd>>>>,
    rename: Mutex<Option<JoinHandle<catalog_sync::Result<Product>>>>,
    published: Mutex<Vec<u64>>,
}

impl Broadcaster for RenameOnFirstAdd {
    fn broadcast(&self, envelope: EventEnvelope) {
        if let ChannelEvent::ProductAdded(product) = &envelope.event {
            let mut rename = self.rename.lock();
            if rename.is_none() {
                if let Some(service) = self.service.get().and_then(Weak::upgrade) {
                    let id = product.id.to_hex();
                    *rename = Some(thread::spawn(move || {
                        service.update(&id, draft(json!({ "name": "Renamed" })))
                    }));
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
        self.published.lock().push(envelope.sequence.0);
        self.channel.broadcast(envelope);
    }
}

#[test]
fn test_racing_update_is_published_after_its_create() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let channel = Arc::new(FanoutChannel::new());
    let broadcaster = Arc::new(RenameOnFirstAdd {
        channel: channel.clone(),
        service: OnceLock::new(),
        rename: Mutex::new(None),
        published: Mutex::new(Vec::new()),
    });
    let service = Arc::new(MutationService::new(test_store(&dir), broadcaster.clone()));
    let _ = broadcaster.service.set(Arc::downgrade(&service));

    let mut session = SyncSession::bootstrap(
        service.clone(),
        channel.clone(),
        SyncConfig {
            resync_interval: None,
            ..Default::default()
        },
    )
    .unwrap();

    let created = service.create(phone()).unwrap();
    let rename = broadcaster.rename.lock().take().unwrap();
    let renamed = rename.join().unwrap().unwrap();
    assert_eq!(renamed.name, "Renamed");
    assert_eq!(renamed.revision, 2);

    assert_eq!(*broadcaster.published.lock(), vec![1, 2]);

    while session.poll(Duration::from_millis(50)).unwrap() != SyncStep::Idle {}

    let expected = service.list().unwrap();
    let local: Vec<_> = session.catalog().records().cloned().collect();
    assert_eq!(local, expected.records);
    let view = session.catalog().get(&created.id).unwrap();
    assert_eq!(view.name.as_deref(), Some("Renamed"));
    assert_eq!(view.revision, 2);
}

#[test]
fn test_unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (service, _channel) = test_service(&dir);
    let missing = ProductId::new(1_700_000_000, 12345).to_hex();
    assert!(matches!(
        service.get(&missing),
        Err(catalog_sync::CatalogError::NotFound(_))
    ));
}
