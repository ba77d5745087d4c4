//! Volatile record store.

use super::catalog::Catalog;
use super::RecordStore;
use crate::error::{CatalogError, Result};
use crate::types::{Commit, NewProduct, Product, ProductId, ProductPatch, Projection, Sequence, Snapshot};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Record store kept entirely in memory.
pub struct MemoryStore {
    state: RwLock<Catalog>,
    op_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    /// Create a store whose operations give up after `op_timeout` waiting for
    /// the lock.
    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(Catalog::new()),
            op_timeout,
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Catalog>> {
        self.state
            .try_read_for(self.op_timeout)
            .ok_or_else(|| CatalogError::StoreUnavailable("timed out waiting for store".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Catalog>> {
        self.state
            .try_write_for(self.op_timeout)
            .ok_or_else(|| CatalogError::StoreUnavailable("timed out waiting for store".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn insert_with(&self, product: NewProduct, on_commit: &mut dyn FnMut(&Commit)) -> Result<Commit> {
        let mut state = self.write()?;
        let (id, entry) = state.prepare_insert(product);
        state.apply(&entry);

        let commit = state
            .read_back(id, entry.sequence)
            .ok_or_else(|| CatalogError::Corruption(format!("inserted product {} missing", id)))?;
        on_commit(&commit);
        Ok(commit)
    }

    fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn list(&self, projection: &Projection) -> Result<Snapshot> {
        Ok(self.read()?.snapshot(projection))
    }

    fn update_with(
        &self,
        id: ProductId,
        patch: &ProductPatch,
        on_commit: &mut dyn FnMut(&Commit),
    ) -> Result<Option<Commit>> {
        let mut state = self.write()?;
        let Some(entry) = state.prepare_update(id, patch) else {
            return Ok(None);
        };
        state.apply(&entry);

        let commit = state.read_back(id, entry.sequence);
        if let Some(commit) = &commit {
            on_commit(commit);
        }
        Ok(commit)
    }

    fn delete_with(&self, id: ProductId, on_commit: &mut dyn FnMut(Sequence)) -> Result<Option<Sequence>> {
        let mut state = self.write()?;
        let Some(entry) = state.prepare_delete(id) else {
            return Ok(None);
        };
        state.apply(&entry);
        on_commit(entry.sequence);
        Ok(Some(entry.sequence))
    }

    fn head(&self) -> Sequence {
        self.state.read().head()
    }
}
