//! In-memory catalog state shared by the store implementations.
//!
//! Mutations are split in two steps: `prepare_*` computes the log entry for
//! a change without touching state, and `apply` folds an entry in. The file
//! store persists the entry between the two; replay on open uses `apply`
//! alone.

use super::log::{LogEntry, LogOp};
use crate::types::{unix_secs, Commit, NewProduct, Product, ProductId, ProductPatch, Projection, Sequence, Snapshot};
use std::collections::BTreeMap;

/// Default for `available` when an insert leaves it unset.
const DEFAULT_AVAILABLE: bool = true;

#[derive(Debug)]
pub(crate) struct Catalog {
    /// Records keyed by identifier counter, which is insertion order.
    records: BTreeMap<u64, Product>,
    /// Next identifier counter. Never decreases.
    next_counter: u64,
    /// Last applied sequence.
    head: Sequence,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_counter: 1,
            head: Sequence(0),
        }
    }

    pub fn head(&self) -> Sequence {
        self.head
    }

    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.records.get(&id.counter()).filter(|p| p.id == id)
    }

    pub fn snapshot(&self, projection: &Projection) -> Snapshot {
        Snapshot {
            as_of: self.head,
            records: self.records.values().map(|p| p.project(projection)).collect(),
        }
    }

    /// The stored record as a commit, read back after `apply`.
    pub fn read_back(&self, id: ProductId, sequence: Sequence) -> Option<Commit> {
        self.get(id).cloned().map(|product| Commit { sequence, product })
    }

    pub fn prepare_insert(&self, input: NewProduct) -> (ProductId, LogEntry) {
        let product = Product {
            id: ProductId::new(unix_secs(), self.next_counter),
            name: input.name,
            price: input.price,
            category: input.category,
            rating: input.rating,
            warranty_years: input.warranty_years,
            available: input.available.unwrap_or(DEFAULT_AVAILABLE),
            revision: 1,
        };
        let id = product.id;
        let entry = LogEntry {
            sequence: self.head.next(),
            op: LogOp::Put(product),
        };
        (id, entry)
    }

    pub fn prepare_update(&self, id: ProductId, patch: &ProductPatch) -> Option<LogEntry> {
        let mut product = self.get(id)?.clone();
        patch.apply_to(&mut product);
        product.revision += 1;
        Some(LogEntry {
            sequence: self.head.next(),
            op: LogOp::Put(product),
        })
    }

    pub fn prepare_delete(&self, id: ProductId) -> Option<LogEntry> {
        self.get(id)?;
        Some(LogEntry {
            sequence: self.head.next(),
            op: LogOp::Delete(id),
        })
    }

    /// Fold an entry into the state.
    pub fn apply(&mut self, entry: &LogEntry) {
        match &entry.op {
            LogOp::Put(product) => {
                let counter = product.id.counter();
                self.next_counter = self.next_counter.max(counter + 1);
                self.records.insert(counter, product.clone());
            }
            LogOp::Delete(id) => {
                if self.get(*id).is_some() {
                    self.records.remove(&id.counter());
                }
            }
            LogOp::Checkpoint { next_counter } => {
                self.next_counter = self.next_counter.max(*next_counter);
            }
        }
        self.head = self.head.max(entry.sequence);
    }

    /// Entries that rebuild this exact state, counter and head included.
    pub fn checkpoint_entries(&self) -> Vec<LogEntry> {
        let mut entries = Vec::with_capacity(self.records.len() + 1);
        entries.push(LogEntry {
            sequence: self.head,
            op: LogOp::Checkpoint {
                next_counter: self.next_counter,
            },
        });
        entries.extend(self.records.values().map(|p| LogEntry {
            sequence: self.head,
            op: LogOp::Put(p.clone()),
        }));
        entries
    }
}
