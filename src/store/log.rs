//! Append-only product operation log.
//!
//! Layout: a 5-byte header (magic + version) followed by frames of
//! `[len: u32 LE][entry: MessagePack][crc32(entry): u32 LE]`.

use crate::error::{CatalogError, Result};
use crate::types::{Product, ProductId, Sequence};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the product log.
const LOG_MAGIC: &[u8; 4] = b"CAT\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

const HEADER_SIZE: u64 = 5;

/// Upper bound on a single frame.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One durable change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: Sequence,
    pub op: LogOp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogOp {
    /// Full record after an insert or update.
    Put(Product),
    /// Record removed; its identifier is retired.
    Delete(ProductId),
    /// Counter floor written by compaction so retired identifiers stay retired.
    Checkpoint { next_counter: u64 },
}

/// Append-only log file.
pub struct ProductLog {
    path: PathBuf,
    file: File,
    /// Offset one past the last complete frame.
    size: u64,
    writes_since_sync: u64,
    sync_interval: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl ProductLog {
    /// Create an empty log, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.sync_all()?;

        Ok(Self {
            path,
            file,
            size: HEADER_SIZE,
            writes_since_sync: 0,
            sync_interval: sync_interval.max(1),
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Open an existing log and return every intact entry in order.
    ///
    /// A torn final frame (crash mid-append) is truncated away. A checksum
    /// mismatch on a complete frame is reported as corruption.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<LogEntry>)> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file.try_clone()?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(CatalogError::InvalidFormat("Invalid log magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(CatalogError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < file_len {
            match Self::read_frame(&mut reader) {
                Ok((entry, frame_len)) => {
                    entries.push(entry);
                    offset += frame_len;
                }
                Err(CatalogError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        discarded = file_len - offset,
                        "truncating torn log tail"
                    );
                    file.set_len(offset)?;
                    file.sync_all()?;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let mut log = Self {
            path,
            file,
            size: offset,
            writes_since_sync: 0,
            sync_interval: sync_interval.max(1),
            #[cfg(test)]
            fail_next_sync: false,
        };
        log.file.seek(SeekFrom::Start(log.size))?;

        Ok((log, entries))
    }

    /// Append one entry. The entry is durable once this returns, subject to
    /// `sync_interval`.
    ///
    /// On failure the file is cut back to the last complete frame, so a
    /// rejected entry is never replayed. A failed cut is reported in place of
    /// the original error.
    pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
        let encoded = rmp_serde::to_vec(entry)?;
        if encoded.len() > MAX_FRAME_SIZE {
            return Err(CatalogError::Serialization("log entry too large".into()));
        }

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());

        self.file.seek(SeekFrom::Start(self.size))?;
        let sync_due = self.writes_since_sync + 1 >= self.sync_interval;
        if let Err(e) = self.write_frame(&frame, sync_due) {
            tracing::error!(path = %self.path.display(), error = %e, "log append failed");
            self.truncate_tail()?;
            return Err(e.into());
        }

        self.writes_since_sync = if sync_due { 0 } else { self.writes_since_sync + 1 };
        self.size += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> std::io::Result<()> {
        self.file.write_all(frame)?;
        if sync {
            self.sync_data()?;
        }
        Ok(())
    }

    fn sync_data(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::other("injected sync failure"));
        }
        self.file.sync_data()
    }

    /// Drop everything past the last complete frame.
    fn truncate_tail(&mut self) -> Result<()> {
        self.file.set_len(self.size)?;
        self.file.sync_data()?;
        self.file.seek(SeekFrom::Start(self.size))?;
        Ok(())
    }

    /// Force pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Atomically replace the log with `entries`.
    pub fn rewrite(&mut self, entries: &[LogEntry]) -> Result<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = ProductLog::create(&tmp_path, u64::MAX)?;
            for entry in entries {
                tmp.append(entry)?;
            }
            tmp.sync()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let (reopened, _) = ProductLog::open(&self.path, self.sync_interval)?;
        *self = reopened;
        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_frame(reader: &mut BufReader<File>) -> Result<(LogEntry, u64)> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(CatalogError::Corruption("log frame too large".into()));
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(CatalogError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok((entry, (len + 8) as u64))
    }
}
