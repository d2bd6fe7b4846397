//! Persistent storage backend using an AOF (Append-Only File).
//!
//! Every write is appended as a length-prefixed bincode frame before it is
//! applied to the in-memory tables. On open the log is replayed into a fresh
//! `MemoryBackend`.

use super::memory::MemoryBackend;
use super::{StorageBackend, StorageStats};
use crate::error::{PipError, Result};
use bytes::{Buf, BufMut, BytesMut};
use geo::Rect;
use parking_lot::Mutex;
use pipdb_types::index::IndexedGeometry;
use pipdb_types::spr::Spr;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SCRATCH_INITIAL_CAPACITY: usize = 8 * 1024;
const SCRATCH_SHRINK_THRESHOLD: usize = 1 << 20;
const FRAME_HEADER_LEN: usize = 4;

/// One logged write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AOFCommand {
    ReplaceGeometries {
        identity: String,
        rows: Vec<IndexedGeometry>,
    },
    PutSummary {
        spr: Spr,
    },
    PutGeometry {
        id: String,
        alt_label: String,
        body: String,
    },
    DeleteVariant {
        id: String,
        alt_label: String,
    },
}

/// Append-only command log
pub struct AOFFile {
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    scratch: BytesMut,
}

impl AOFFile {
    /// Open (or create) the log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        Ok(AOFFile {
            writer: BufWriter::new(file),
            path,
            size,
            scratch: BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY),
        })
    }

    /// Get current file size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a command and flush it to the OS
    pub fn append(&mut self, command: &AOFCommand) -> Result<()> {
        let payload = bincode::serialize(command)?;
        let frame_len = u32::try_from(payload.len()).map_err(|_| {
            PipError::Serialization(format!("command of {} bytes is too large", payload.len()))
        })?;

        self.scratch.clear();
        self.scratch.reserve(FRAME_HEADER_LEN + payload.len());
        self.scratch.put_u32_le(frame_len);
        self.scratch.put_slice(&payload);

        self.writer.write_all(&self.scratch)?;
        self.writer.flush()?;
        self.size += self.scratch.len() as u64;

        if self.scratch.capacity() > SCRATCH_SHRINK_THRESHOLD {
            self.scratch = BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY);
        }

        Ok(())
    }

    /// Flush and sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Read every complete command in the log.
    ///
    /// A trailing partial frame (a write cut short by a crash) is dropped and
    /// the file truncated to the last complete frame. A frame that is complete
    /// but does not decode is `InvalidFormat`.
    pub fn replay(&mut self) -> Result<Vec<AOFCommand>> {
        self.writer.flush()?;

        let mut raw = Vec::new();
        File::open(&self.path)?.read_to_end(&mut raw)?;

        let total = raw.len();
        let mut buf = &raw[..];
        let mut commands = Vec::new();

        while buf.has_remaining() {
            if buf.remaining() < FRAME_HEADER_LEN {
                break;
            }
            let frame_len = (&buf[..FRAME_HEADER_LEN]).get_u32_le() as usize;
            if buf.remaining() < FRAME_HEADER_LEN + frame_len {
                break;
            }
            buf.advance(FRAME_HEADER_LEN);

            let command: AOFCommand =
                bincode::deserialize(&buf[..frame_len]).map_err(|_| PipError::InvalidFormat)?;
            commands.push(command);
            buf.advance(frame_len);
        }

        let valid = total - buf.remaining();
        if valid < total {
            log::warn!(
                "Truncating {} trailing bytes of partial frame in {}",
                total - valid,
                self.path.display()
            );
            self.writer.get_ref().set_len(valid as u64)?;
            self.size = valid as u64;
        }

        Ok(commands)
    }

    /// Replace the log with `commands`, written to a temp file and renamed over.
    pub fn rewrite(&mut self, commands: &[AOFCommand]) -> Result<()> {
        let rewrite_path = self.path.with_extension("aof.rewrite");
        let _ = std::fs::remove_file(&rewrite_path);

        {
            let mut rewrite_file = AOFFile::open(&rewrite_path)?;
            for command in commands {
                rewrite_file.append(command)?;
            }
            // Sync rewritten file to disk before rename
            rewrite_file.sync()?;
        }

        std::fs::rename(&rewrite_path, &self.path)?;

        *self = AOFFile::open(&self.path)?;
        Ok(())
    }
}

impl Drop for AOFFile {
    fn drop(&mut self) {
        // Best effort flush on drop, ignore errors
        let _ = self.writer.flush();
    }
}

/// Persistent storage backend using AOF (Append-Only File)
pub struct AOFBackend {
    memory: MemoryBackend,
    log: Mutex<AOFFile>,
}

impl AOFBackend {
    /// Open the log at `path` and replay it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let backend = Self {
            memory: MemoryBackend::new(),
            log: Mutex::new(AOFFile::open(path)?),
        };
        backend.load_from_aof()?;
        Ok(backend)
    }

    fn load_from_aof(&self) -> Result<()> {
        let commands = self.log.lock().replay()?;
        let replayed = commands.len();
        let mut geometries: FxHashMap<String, Vec<IndexedGeometry>> = FxHashMap::default();

        for command in commands {
            match command {
                AOFCommand::ReplaceGeometries { identity, rows } => {
                    if rows.is_empty() {
                        geometries.remove(&identity);
                    } else {
                        geometries.insert(identity, rows);
                    }
                }
                AOFCommand::PutSummary { spr } => self.memory.put_summary(&spr)?,
                AOFCommand::PutGeometry {
                    id,
                    alt_label,
                    body,
                } => self.memory.put_geometry(&id, &alt_label, &body)?,
                AOFCommand::DeleteVariant { id, alt_label } => {
                    self.memory.delete_variant(&id, &alt_label)?
                }
            }
        }

        self.memory.bulk_load(geometries);
        log::debug!("Replayed {} commands from append-only file", replayed);
        Ok(())
    }

    /// Rewrite the log so it holds only the current state of every table.
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        let dump = self.memory.dump();

        let mut commands = Vec::with_capacity(
            dump.geometries.len() + dump.summaries.len() + dump.bodies.len(),
        );
        commands.extend(
            dump.geometries
                .into_iter()
                .map(|(identity, rows)| AOFCommand::ReplaceGeometries { identity, rows }),
        );
        commands.extend(
            dump.summaries
                .into_iter()
                .map(|spr| AOFCommand::PutSummary { spr }),
        );
        commands.extend(dump.bodies.into_iter().map(|(path, body)| {
            AOFCommand::PutGeometry {
                id: path.id().to_string(),
                alt_label: path.storage_label().to_string(),
                body,
            }
        }));

        let before = log.size();
        log.rewrite(&commands)?;
        log::debug!(
            "Compacted append-only file from {} to {} bytes",
            before,
            log.size()
        );
        Ok(())
    }

    /// Current size of the log in bytes
    pub fn log_size(&self) -> u64 {
        self.log.lock().size()
    }
}

impl StorageBackend for AOFBackend {
    fn replace_geometries(&self, identity: &str, rows: Vec<IndexedGeometry>) -> Result<()> {
        // Write to AOF first for durability; hold the lock so log order matches apply order
        let mut log = self.log.lock();
        log.append(&AOFCommand::ReplaceGeometries {
            identity: identity.to_string(),
            rows: rows.clone(),
        })?;
        self.memory.replace_geometries(identity, rows)
    }

    fn alternate_labels(&self, identity: &str) -> Result<Vec<String>> {
        self.memory.alternate_labels(identity)
    }

    fn query_intersecting(&self, rect: &Rect) -> Result<Vec<IndexedGeometry>> {
        self.memory.query_intersecting(rect)
    }

    fn put_summary(&self, spr: &Spr) -> Result<()> {
        let mut log = self.log.lock();
        log.append(&AOFCommand::PutSummary { spr: spr.clone() })?;
        self.memory.put_summary(spr)
    }

    fn get_summary(&self, id: &str, alt_label: &str) -> Result<Option<Spr>> {
        self.memory.get_summary(id, alt_label)
    }

    fn put_geometry(&self, id: &str, alt_label: &str, body: &str) -> Result<()> {
        let mut log = self.log.lock();
        log.append(&AOFCommand::PutGeometry {
            id: id.to_string(),
            alt_label: alt_label.to_string(),
            body: body.to_string(),
        })?;
        self.memory.put_geometry(id, alt_label, body)
    }

    fn get_geometry(&self, id: &str, alt_label: &str) -> Result<Option<String>> {
        self.memory.get_geometry(id, alt_label)
    }

    fn delete_variant(&self, id: &str, alt_label: &str) -> Result<()> {
        let mut log = self.log.lock();
        log.append(&AOFCommand::DeleteVariant {
            id: id.to_string(),
            alt_label: alt_label.to_string(),
        })?;
        self.memory.delete_variant(id, alt_label)
    }

    fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    fn close(&self) -> Result<()> {
        self.log.lock().sync()?;
        self.memory.close()
    }

    fn stats(&self) -> Result<StorageStats> {
        self.memory.stats()
    }
}
