//! Durable record store backed by the product log.

use super::catalog::Catalog;
use super::log::ProductLog;
use super::{RecordStore, StoreConfig};
use crate::error::{CatalogError, Result};
use crate::types::{Commit, NewProduct, Product, ProductId, ProductPatch, Projection, Sequence, Snapshot};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"CTS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const LOG_FILE: &str = "catalog.log";

/// Record store persisted as an append-only log.
///
/// Every change is written to the log before it becomes visible. The state
/// lock is held across the write, so a change either lands in both the log
/// and memory or in neither.
pub struct FileStore {
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    state: RwLock<Catalog>,

    log: Mutex<ProductLog>,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(CatalogError::InvalidFormat(format!(
                "no store at {}",
                config.path.display()
            )))
        }
    }

    /// Create a new, empty store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::write_manifest(&config.path)?;

        let log = ProductLog::create(config.path.join(LOG_FILE), config.sync_interval)?;
        tracing::info!(path = %config.path.display(), "created catalog store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            state: RwLock::new(Catalog::new()),
            log: Mutex::new(log),
        })
    }

    /// Open an existing store and replay its log.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (log, entries) = ProductLog::open(config.path.join(LOG_FILE), config.sync_interval)?;
        let mut catalog = Catalog::new();
        for entry in &entries {
            catalog.apply(entry);
        }

        tracing::info!(
            path = %config.path.display(),
            entries = entries.len(),
            records = catalog.len(),
            head = %catalog.head(),
            next_counter = catalog.next_counter(),
            "opened catalog store"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            state: RwLock::new(catalog),
            log: Mutex::new(log),
        })
    }

    /// Rewrite the log to hold only live records.
    ///
    /// The identifier counter and head sequence are preserved, so deleted
    /// identifiers stay retired.
    pub fn compact(&self) -> Result<()> {
        let state = self.write()?;
        let entries = state.checkpoint_entries();
        let mut log = self.log.lock();
        let before = log.size();
        log.rewrite(&entries)?;

        tracing::info!(
            before_bytes = before,
            after_bytes = log.size(),
            records = state.len(),
            "compacted catalog log"
        );
        Ok(())
    }

    /// Force all log writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the log in bytes.
    pub fn log_size(&self) -> u64 {
        self.log.lock().size()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Catalog>> {
        self.state
            .try_read_for(self.config.op_timeout)
            .ok_or_else(|| CatalogError::StoreUnavailable("timed out waiting for store".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Catalog>> {
        self.state
            .try_write_for(self.config.op_timeout)
            .ok_or_else(|| CatalogError::StoreUnavailable("timed out waiting for store".into()))
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(CatalogError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(CatalogError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CatalogError::Locked)?;
        Ok(lock_file)
    }
}

impl RecordStore for FileStore {
    fn insert_with(&self, product: NewProduct, on_commit: &mut dyn FnMut(&Commit)) -> Result<Commit> {
        let mut state = self.write()?;
        let (id, entry) = state.prepare_insert(product);
        self.log.lock().append(&entry)?;
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
        self.log.lock().append(&entry)?;
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
        self.log.lock().append(&entry)?;
        state.apply(&entry);
        on_commit(entry.sequence);
        Ok(Some(entry.sequence))
    }

    fn head(&self) -> Sequence {
        self.state.read().head()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.log.get_mut().sync();
    }
}
