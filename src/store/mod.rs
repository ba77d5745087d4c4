//! Record store: durable keyed storage of products.
//!
//! The store is the single source of truth. It owns identifier assignment,
//! per-record revisions and the store-wide commit [`Sequence`]. Every
//! mutating operation is atomic per record and returns the record as read
//! back after the change, so callers never observe a half-applied write.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: volatile, for tests and embedding.
//! - [`FileStore`]: an append-only operation log replayed on open.
//!
//! # Example
//!
//! ```ignore
//! let store = FileStore::open_or_create(StoreConfig {
//!     path: "./catalog".into(),
//!     ..Default::default()
//! })?;
//!
//! let commit = store.insert(new_product)?;
//! let snapshot = store.list(&Projection::LISTING)?;
//! ```

mod catalog;
mod file;
mod log;
mod memory;

pub use file::FileStore;
pub use log::{LogEntry, LogOp, ProductLog};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Commit, NewProduct, Product, ProductId, ProductPatch, Projection, Sequence, Snapshot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding the store files.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync the log every N writes (0 and 1 both mean every write).
    pub sync_interval: u64,

    /// Longest wait for the store lock before failing with
    /// `StoreUnavailable`.
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./catalog"),
            create_if_missing: true,
            sync_interval: 1,
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// Keyed product storage.
///
/// All operations are atomic with respect to a single record. Absence is
/// reported as `None`; errors are reserved for store failures.
///
/// The `*_with` variants run `on_commit` after the change is durable but
/// before the store releases its write lock, so callbacks observe commits in
/// sequence order.
pub trait RecordStore: Send + Sync {
    /// Assign an identifier, persist, and return the stored record.
    fn insert_with(&self, product: NewProduct, on_commit: &mut dyn FnMut(&Commit)) -> Result<Commit>;

    fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Enumerate all records in insertion order, restricted to `projection`.
    fn list(&self, projection: &Projection) -> Result<Snapshot>;

    /// Merge `patch` into the record and return the merged record.
    fn update_with(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        on_commit: &mut dyn FnMut(&Commit),
    ) -> Result<Option<Commit>>;

    /// Remove the record, retiring its identifier.
    fn delete_with(&self, id: ProductId, on_commit: &mut dyn FnMut(Sequence)) -> Result<Option<Sequence>>;

    /// Sequence of the last committed change.
    fn head(&self) -> Sequence;

    fn insert(&self, product: NewProduct) -> Result<Commit> {
        self.insert_with(product, &mut |_| {})
    }

    fn update(&self, id: ProductId, patch: &ProductPatch) -> Result<Option<Commit>> {
        self.update_with(id, patch, &mut |_| {})
    }

    fn delete(&self, id: ProductId) -> Result<Option<Sequence>> {
        self.delete_with(id, &mut |_| {})
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn insert_with(&self, product: NewProduct, on_commit: &mut dyn FnMut(&Commit)) -> Result<Commit> {
        (**self).insert_with(product, on_commit)
    }

    fn get(&self, id: ProductId) -> Result<Option<Product>> {
        (**self).get(id)
    }

    fn list(&self, projection: &Projection) -> Result<Snapshot> {
        (**self).list(projection)
    }

    fn update_with(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        on_commit: &mut dyn FnMut(&Commit),
    ) -> Result<Option<Commit>> {
        (**self).update_with(id, patch, on_commit)
    }

    fn delete_with(&self, id: ProductId, on_commit: &mut dyn FnMut(Sequence)) -> Result<Option<Sequence>> {
        (**self).delete_with(id, on_commit)
    }

    fn head(&self) -> Sequence {
        (**self).head()
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    fn insert_with(&self, product: NewProduct, on_commit: &mut dyn FnMut(&Commit)) -> Result<Commit> {
        (**self).insert_with(product, on_commit)
    }

    fn get(&self, id: ProductId) -> Result<Option<Product>> {
        (**self).get(id)
    }

    fn list(&self, projection: &Projection) -> Result<Snapshot> {
        (**self).list(projection)
    }

    fn update_with(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        on_commit: &mut dyn FnMut(&Commit),
    ) -> Result<Option<Commit>> {
        (**self).update_with(id, patch, on_commit)
    }

    fn delete_with(&self, id: ProductId, on_commit: &mut dyn FnMut(Sequence)) -> Result<Option<Sequence>> {
        (**self).delete_with(id, on_commit)
    }

    fn head(&self) -> Sequence {
        (**self).head()
    }
}
