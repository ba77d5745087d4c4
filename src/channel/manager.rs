//! Fan-out channel for broadcasting product changes.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    ChannelConfig, Delivery, DropReason, EventEnvelope, ObserverConfig, ObserverHandle, ObserverId,
};
use super::Broadcaster;
use crate::types::Sequence;

/// Internal observer state.
struct Observer {
    sender: Sender<Delivery>,
}

impl Observer {
    /// Try to enqueue a delivery without blocking.
    fn try_send(&self, delivery: Delivery) -> Result<(), DropReason> {
        match self.sender.try_send(delivery) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(TrySendError::Disconnected(_)) => Err(DropReason::Disconnected),
        }
    }
}

/// Recent envelopes kept for observers that connect from a snapshot.
struct History {
    buffer: VecDeque<EventEnvelope>,
    capacity: usize,
    /// Highest sequence that has left the buffer.
    evicted_through: Sequence,
}

impl History {
    fn push(&mut self, envelope: &EventEnvelope) {
        if self.capacity == 0 {
            self.evicted_through = self.evicted_through.max(envelope.sequence);
            return;
        }
        if self.buffer.len() == self.capacity {
            if let Some(old) = self.buffer.pop_front() {
                self.evicted_through = self.evicted_through.max(old.sequence);
            }
        }
        self.buffer.push_back(envelope.clone());
    }

    /// Buffered envelopes newer than `as_of`, or `None` if some were evicted.
    fn since(&self, as_of: Sequence) -> Option<Vec<&EventEnvelope>> {
        if self.evicted_through > as_of {
            return None;
        }
        Some(self.buffer.iter().filter(|e| e.sequence > as_of).collect())
    }
}

/// Live set of observers plus a bounded replay buffer.
///
/// Delivery is best-effort and never blocks: an observer whose queue is full
/// or whose receiver is gone is dropped, and the others are unaffected.
pub struct FanoutChannel {
    /// Connected observers by ID.
    observers: RwLock<HashMap<ObserverId, Observer>>,
    /// Replay buffer. Always locked before `observers`.
    history: Mutex<History>,
    /// Counter for generating observer IDs.
    next_id: AtomicU64,
}

impl FanoutChannel {
    /// Create a channel with the default replay capacity.
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            history: Mutex::new(History {
                buffer: VecDeque::with_capacity(config.replay_capacity),
                capacity: config.replay_capacity,
                evicted_through: Sequence(0),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect an observer for live events only.
    pub fn connect(&self, config: ObserverConfig) -> ObserverHandle {
        let _history = self.history.lock();
        let (id, observer, handle) = self.new_observer(&config);
        self.observers.write().insert(id, observer);
        tracing::debug!(observer = id.0, "observer connected");
        handle
    }

    /// Connect an observer that holds a snapshot taken at `as_of`.
    ///
    /// Buffered envelopes newer than `as_of` are queued before any live event,
    /// followed by `CaughtUp`. Registration and replay happen under the
    /// history lock, so no broadcast can slip between them. If the buffer no
    /// longer reaches back to `as_of`, or the replay would not fit in the
    /// observer's queue, `ResyncRequired` is queued instead of the replay.
    pub fn connect_from(&self, as_of: Sequence, config: ObserverConfig) -> ObserverHandle {
        let history = self.history.lock();
        let (id, observer, handle) = self.new_observer(&config);

        // Two slots are reserved for the control deliveries.
        let replay = history
            .since(as_of)
            .filter(|pending| pending.len() + 2 <= config.buffer_size);

        match replay {
            Some(pending) => {
                let replayed = pending.len();
                for envelope in pending {
                    let _ = observer.try_send(Delivery::Event {
                        envelope: envelope.clone(),
                    });
                }
                tracing::debug!(observer = id.0, %as_of, replayed, "observer connected with replay");
            }
            None => {
                let _ = observer.try_send(Delivery::ResyncRequired);
                tracing::info!(observer = id.0, %as_of, "replay unavailable, observer must resync");
            }
        }
        let _ = observer.try_send(Delivery::CaughtUp);

        self.observers.write().insert(id, observer);
        handle
    }

    /// Disconnect and clean up.
    pub fn disconnect(&self, id: ObserverId) {
        let mut observers = self.observers.write();
        if let Some(observer) = observers.remove(&id) {
            // Best effort
            let _ = observer.try_send(Delivery::Dropped {
                reason: DropReason::Unsubscribed,
            });
            tracing::debug!(observer = id.0, "observer disconnected");
        }
    }

    /// Number of connected observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Number of envelopes currently available for replay.
    pub fn replay_len(&self) -> usize {
        self.history.lock().buffer.len()
    }

    /// Deliver an envelope to every observer connected right now.
    pub fn publish(&self, envelope: EventEnvelope) {
        let mut history = self.history.lock();
        history.push(&envelope);

        let delivery = Delivery::Event { envelope };
        let mut to_remove = Vec::new();
        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if let Err(reason) = observer.try_send(delivery.clone()) {
                    to_remove.push((*id, reason));
                }
            }
        }

        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for (id, reason) in to_remove {
                if let Some(observer) = observers.remove(&id) {
                    tracing::warn!(observer = id.0, ?reason, "dropping observer");
                    // Try to notify about the drop (might fail, that's ok)
                    let _ = observer.try_send(Delivery::Dropped { reason });
                }
            }
        }
        drop(history);
    }

    fn new_observer(&self, config: &ObserverConfig) -> (ObserverId, Observer, ObserverHandle) {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        (id, Observer { sender }, ObserverHandle { id, receiver })
    }
}

impl Default for FanoutChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for FanoutChannel {
    fn broadcast(&self, envelope: EventEnvelope) {
        self.publish(envelope);
    }
}
