//! Fan-out channel pushing product changes to connected observers.
//!
//! The channel has no persistence. It keeps:
//! - the live observer set, each with a bounded delivery queue
//! - a bounded replay buffer of recent envelopes, keyed by store sequence
//!
//! Delivery is at-most-once and best-effort. A slow or vanished observer is
//! dropped without affecting anyone else or the mutation that triggered the
//! broadcast.
//!
//! # Example
//!
//! ```ignore
//! let channel = FanoutChannel::new();
//!
//! // Bootstrap from a snapshot, then follow live changes
//! let snapshot = service.list()?;
//! let handle = channel.connect_from(snapshot.as_of, ObserverConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(Delivery::Event { envelope }) => println!("{}", envelope.event.name()),
//!         Ok(Delivery::ResyncRequired) => { /* take a fresh snapshot */ }
//!         Ok(Delivery::CaughtUp) => println!("Now live!"),
//!         Ok(Delivery::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::FanoutChannel;
pub use types::{
    ChannelConfig, ChannelEvent, Delivery, DropReason, EventEnvelope, ObserverConfig,
    ObserverHandle, ObserverId,
};

use std::sync::Arc;

/// Sink for committed changes.
///
/// Implementations must not block on observers and must not fail: delivery
/// problems stay on the channel side of this boundary. Broadcasts are issued
/// while the store holds its write lock, so an implementation must not call
/// back into the store.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, envelope: EventEnvelope);
}

impl<T: Broadcaster + ?Sized> Broadcaster for Arc<T> {
    fn broadcast(&self, envelope: EventEnvelope) {
        (**self).broadcast(envelope)
    }
}
