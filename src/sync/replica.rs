//! Observer-side copy of the catalog.

use crate::channel::{ChannelEvent, EventEnvelope};
use crate::types::{ProductId, ProductView, Sequence, Snapshot};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// How many sequences a tombstone outlives the delete that created it.
const TOMBSTONE_WINDOW: u64 = 1024;

/// Local replica built from a snapshot and kept current by applying events.
///
/// The channel delivers in commit order. Application is still guarded per
/// record so that replayed or duplicated events are harmless:
/// - revisions only move forward
/// - deleted identifiers are tombstoned
/// - anything at or below the snapshot sequence is already reflected
///
/// Tombstones are pruned once the replica has applied `TOMBSTONE_WINDOW`
/// sequences past the delete. In commit order a create always precedes its
/// delete, so only redelivery inside that window can hit one.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    records: BTreeMap<ProductId, ProductView>,
    /// Deleted id to the sequence of its delete.
    tombstones: HashMap<ProductId, Sequence>,
    /// Tombstones in the order they were recorded, for pruning.
    tombstone_order: VecDeque<(Sequence, ProductId)>,
    /// Sequence of the snapshot this replica was built from.
    as_of: Sequence,
    /// Highest sequence applied since the snapshot.
    last_applied: Sequence,
}

impl LocalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut catalog = Self::new();
        catalog.replace(snapshot);
        catalog
    }

    /// Discard local state and adopt `snapshot` wholesale.
    pub fn replace(&mut self, snapshot: Snapshot) {
        self.records = snapshot
            .records
            .into_iter()
            .map(|view| (view.id, view))
            .collect();
        self.tombstones.clear();
        self.tombstone_order.clear();
        self.as_of = snapshot.as_of;
        self.last_applied = snapshot.as_of;
    }

    /// Apply one event. Returns whether the local copy changed.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> bool {
        if envelope.sequence <= self.as_of {
            return false;
        }
        self.last_applied = self.last_applied.max(envelope.sequence);
        self.prune_tombstones();

        match &envelope.event {
            ChannelEvent::ProductAdded(product) => {
                if self.tombstones.contains_key(&product.id) || self.records.contains_key(&product.id) {
                    return false;
                }
                self.records.insert(product.id, ProductView::from(product));
                true
            }
            ChannelEvent::ProductUpdated(product) => match self.records.get_mut(&product.id) {
                Some(current) if product.revision > current.revision => {
                    *current = ProductView::from(product);
                    true
                }
                _ => false,
            },
            ChannelEvent::ProductDeleted(id) => {
                if self.tombstones.insert(*id, envelope.sequence).is_none() {
                    self.tombstone_order.push_back((envelope.sequence, *id));
                }
                self.records.remove(id).is_some()
            }
        }
    }

    fn prune_tombstones(&mut self) {
        let horizon = self.last_applied.0.saturating_sub(TOMBSTONE_WINDOW);
        while let Some(&(sequence, id)) = self.tombstone_order.front() {
            if sequence.0 >= horizon {
                break;
            }
            self.tombstone_order.pop_front();
            self.tombstones.remove(&id);
        }
    }

    pub fn get(&self, id: &ProductId) -> Option<&ProductView> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.records.contains_key(id)
    }

    /// Records in identifier order.
    pub fn records(&self) -> impl Iterator<Item = &ProductView> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_of(&self) -> Sequence {
        self.as_of
    }

    pub fn last_applied(&self) -> Sequence {
        self.last_applied
    }

    /// Number of deleted identifiers still remembered.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }
}
