//! # Catalog Sync
//!
//! A product catalog whose store, mutation service and change fan-out stay
//! consistent with each other.
//!
//! ## Core Concepts
//!
//! - **Store**: Single source of truth; assigns ids, revisions and a
//!   store-wide commit sequence
//! - **Mutation Service**: Validates input, writes, then broadcasts the
//!   canonical record exactly once
//! - **Fan-out Channel**: Best-effort delivery to connected observers, with a
//!   short replay buffer for clients bootstrapping from a snapshot
//! - **Sync**: Observer-side replica that applies events and resyncs when it
//!   may have missed something
//!
//! ## Example
//!
//! ```ignore
//! use catalog_sync::{FanoutChannel, FileStore, MutationService, StoreConfig};
//!
//! let store = FileStore::open_or_create(StoreConfig {
//!     path: "./catalog".into(),
//!     ..Default::default()
//! })?;
//! let channel = Arc::new(FanoutChannel::new());
//! let service = MutationService::new(store, channel.clone());
//!
//! // Create a product; every observer gets `productAdded`
//! let product = service.create(serde_json::from_value(json!({
//!     "name": "Phone", "price": 499, "type": "Electronics",
//!     "rating": 4.5, "warranty_years": 2
//! }))?)?;
//!
//! // Follow the catalog from another thread
//! let mut session = SyncSession::bootstrap(Arc::new(service), channel, SyncConfig::default())?;
//! session.poll(Duration::from_secs(1))?;
//! ```

pub mod channel;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod service;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use channel::{
    Broadcaster, ChannelConfig, ChannelEvent, Delivery, DropReason, EventEnvelope, FanoutChannel,
    ObserverConfig, ObserverHandle, ObserverId,
};
pub use error::{CatalogError, ErrorKind, Result};
pub use service::validate::{clamp_rating, validate_new, validate_patch, MAX_RATING, MIN_RATING};
pub use service::MutationService;
pub use store::{FileStore, MemoryStore, RecordStore, StoreConfig};
pub use sync::{LocalCatalog, SnapshotSource, SyncConfig, SyncSession, SyncStep};
pub use types::*;
