//! Channel event and observer types.

use crate::types::{Product, ProductId, Sequence};
use serde::{Deserialize, Serialize};

/// A change pushed to observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ChannelEvent {
    /// A product was created. Carries the canonical record.
    ProductAdded(Product),
    /// A product was updated. Carries the full canonical record, never a diff.
    ProductUpdated(Product),
    /// A product was deleted. Only the identifier survives.
    ProductDeleted(ProductId),
}

impl ChannelEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::ProductAdded(_) => "productAdded",
            ChannelEvent::ProductUpdated(_) => "productUpdated",
            ChannelEvent::ProductDeleted(_) => "productDeleted",
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            ChannelEvent::ProductAdded(p) | ChannelEvent::ProductUpdated(p) => p.id,
            ChannelEvent::ProductDeleted(id) => *id,
        }
    }
}

/// An event stamped with the store sequence of the commit that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: Sequence,
    #[serde(flatten)]
    pub event: ChannelEvent,
}

impl EventEnvelope {
    pub fn new(sequence: Sequence, event: ChannelEvent) -> Self {
        Self { sequence, event }
    }
}

/// What an observer receives on its queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Delivery {
    /// A change.
    Event { envelope: EventEnvelope },

    /// Replay finished; everything after this is live.
    CaughtUp,

    /// Events newer than the observer's snapshot are no longer buffered.
    /// The observer must take a fresh snapshot.
    ResyncRequired,

    /// The observer was removed from the channel.
    Dropped { reason: DropReason },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DropReason {
    /// Delivery queue overflowed (slow consumer).
    BufferOverflow,
    /// Receiving side went away.
    Disconnected,
    /// Explicitly disconnected.
    Unsubscribed,
}

/// Configuration for a single observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Max queued deliveries before the observer is dropped.
    /// Default: 1024
    pub buffer_size: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

/// Channel-wide configuration.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Number of recent envelopes kept for replay to connecting observers.
    /// Zero disables replay.
    /// Default: 256
    pub replay_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 256,
        }
    }
}

/// Session handle identifying a connected observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Receiving end of an observer connection.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive deliveries.
    pub receiver: crossbeam_channel::Receiver<Delivery>,
}

impl ObserverHandle {
    /// Receive the next delivery (blocking).
    pub fn recv(&self) -> Result<Delivery, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a delivery (non-blocking).
    pub fn try_recv(&self) -> Result<Delivery, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Delivery, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }
}
