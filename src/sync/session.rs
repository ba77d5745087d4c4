//! Bootstrap and resync loop for a single observer.

use super::replica::LocalCatalog;
use crate::channel::{Broadcaster, Delivery, FanoutChannel, ObserverConfig, ObserverHandle, ObserverId};
use crate::error::Result;
use crate::service::MutationService;
use crate::store::RecordStore;
use crate::types::{ProductId, Snapshot};
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Something that can produce a full catalog snapshot.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<Snapshot>;
}

impl<S: RecordStore, B: Broadcaster> SnapshotSource for MutationService<S, B> {
    fn snapshot(&self) -> Result<Snapshot> {
        self.list()
    }
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn snapshot(&self) -> Result<Snapshot> {
        (**self).snapshot()
    }
}

/// Configuration for a sync session.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Queue settings for the underlying observer.
    pub observer: ObserverConfig,

    /// Take a fresh snapshot at least this often, even if nothing went wrong.
    /// `None` disables periodic resync.
    /// Default: 5 minutes
    pub resync_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            observer: ObserverConfig::default(),
            resync_interval: Some(Duration::from_secs(300)),
        }
    }
}

/// Outcome of one [`SyncSession::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStep {
    /// An event changed the local catalog.
    Applied(ProductId),
    /// An event arrived but was already reflected or stale.
    Ignored(ProductId),
    /// Replay finished; subsequent events are live.
    CaughtUp,
    /// The local catalog was rebuilt from a fresh snapshot.
    Resynced,
    /// Nothing arrived within the timeout.
    Idle,
}

/// A local catalog kept in step with the fan-out channel.
///
/// Bootstraps from a snapshot, then connects from the snapshot's sequence so
/// the replay buffer covers anything committed in between. Any sign of lost
/// events triggers a resync.
pub struct SyncSession<S: SnapshotSource> {
    source: S,
    channel: Arc<FanoutChannel>,
    config: SyncConfig,
    catalog: LocalCatalog,
    handle: ObserverHandle,
    last_sync: Instant,
    live: bool,
}

impl<S: SnapshotSource> SyncSession<S> {
    /// Take the initial snapshot and connect.
    pub fn bootstrap(source: S, channel: Arc<FanoutChannel>, config: SyncConfig) -> Result<Self> {
        let snapshot = source.snapshot()?;
        let handle = channel.connect_from(snapshot.as_of, config.observer.clone());
        tracing::info!(
            observer = handle.id.0,
            as_of = %snapshot.as_of,
            records = snapshot.records.len(),
            "sync session bootstrapped"
        );

        Ok(Self {
            source,
            channel,
            config,
            catalog: LocalCatalog::from_snapshot(snapshot),
            handle,
            last_sync: Instant::now(),
            live: false,
        })
    }

    /// Re-pull a snapshot, replace the local copy and reconnect from it.
    ///
    /// On error the previous catalog and connection are left in place.
    pub fn resync(&mut self) -> Result<()> {
        let snapshot = self.source.snapshot()?;
        let handle = self
            .channel
            .connect_from(snapshot.as_of, self.config.observer.clone());

        let old = std::mem::replace(&mut self.handle, handle);
        self.channel.disconnect(old.id);

        tracing::info!(
            observer = self.handle.id.0,
            as_of = %snapshot.as_of,
            records = snapshot.records.len(),
            "sync session resynced"
        );
        self.catalog.replace(snapshot);
        self.last_sync = Instant::now();
        self.live = false;
        Ok(())
    }

    /// Wait up to `timeout` for one delivery and apply it.
    pub fn poll(&mut self, timeout: Duration) -> Result<SyncStep> {
        if self.resync_due() {
            self.resync()?;
            return Ok(SyncStep::Resynced);
        }

        match self.handle.recv_timeout(timeout) {
            Ok(Delivery::Event { envelope }) => {
                let id = envelope.event.product_id();
                if self.catalog.apply(&envelope) {
                    Ok(SyncStep::Applied(id))
                } else {
                    Ok(SyncStep::Ignored(id))
                }
            }
            Ok(Delivery::CaughtUp) => {
                self.live = true;
                Ok(SyncStep::CaughtUp)
            }
            Ok(Delivery::ResyncRequired) => {
                self.resync()?;
                Ok(SyncStep::Resynced)
            }
            Ok(Delivery::Dropped { reason }) => {
                tracing::warn!(observer = self.handle.id.0, ?reason, "observer dropped, resyncing");
                self.resync()?;
                Ok(SyncStep::Resynced)
            }
            Err(RecvTimeoutError::Timeout) => Ok(SyncStep::Idle),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(observer = self.handle.id.0, "observer queue closed, resyncing");
                self.resync()?;
                Ok(SyncStep::Resynced)
            }
        }
    }

    /// Apply everything currently queued without waiting.
    pub fn drain(&mut self) -> Result<usize> {
        let mut applied = 0;
        loop {
            match self.poll(Duration::ZERO)? {
                SyncStep::Idle => return Ok(applied),
                SyncStep::Applied(_) => applied += 1,
                _ => {}
            }
        }
    }

    pub fn catalog(&self) -> &LocalCatalog {
        &self.catalog
    }

    /// Whether replay has finished for the current connection.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn observer_id(&self) -> ObserverId {
        self.handle.id
    }

    fn resync_due(&self) -> bool {
        self.config
            .resync_interval
            .is_some_and(|interval| self.last_sync.elapsed() >= interval)
    }
}

impl<S: SnapshotSource> Drop for SyncSession<S> {
    fn drop(&mut self) {
        self.channel.disconnect(self.handle.id);
    }
}
