//! Storage backend abstraction for pipdb
//!
//! A backend persists three logical tables, all keyed by `(id, alt_label)`:
//! bounding-box rows, flattened summaries, and geometry bodies. The engine
//! only talks to the `StorageBackend` trait, so backends can be swapped
//! without touching query code.

use crate::error::Result;
use geo::Rect;
use pipdb_types::index::IndexedGeometry;
use pipdb_types::spr::Spr;

#[cfg(feature = "aof")]
mod aof;
mod memory;
pub mod registry;

#[cfg(feature = "aof")]
pub use aof::{AOFBackend, AOFCommand, AOFFile};
pub use memory::MemoryBackend;
pub use registry::{BackendConstructor, BackendRegistry};

/// Trait for storage backend implementations
///
/// Methods take `&self`; implementations guard their tables internally so
/// index writes and queries can interleave.
pub trait StorageBackend: Send + Sync {
    /// Replace every bounding-box row of `identity` (canonical and alternates)
    fn replace_geometries(&self, identity: &str, rows: Vec<IndexedGeometry>) -> Result<()>;

    /// Distinct alternate labels among the bounding-box rows of `identity`
    fn alternate_labels(&self, identity: &str) -> Result<Vec<String>>;

    /// Rows whose bounds overlap `rect`, inclusive on all four edges, in no particular order
    fn query_intersecting(&self, rect: &Rect) -> Result<Vec<IndexedGeometry>>;

    /// Insert or replace the summary row keyed by the summary's id and alternate label
    fn put_summary(&self, spr: &Spr) -> Result<()>;

    /// Get a summary row; `alt_label` is empty for the canonical geometry
    fn get_summary(&self, id: &str, alt_label: &str) -> Result<Option<Spr>>;

    /// Insert or replace a GeoJSON geometry body
    fn put_geometry(&self, id: &str, alt_label: &str, body: &str) -> Result<()>;

    /// Get a GeoJSON geometry body
    fn get_geometry(&self, id: &str, alt_label: &str) -> Result<Option<String>>;

    /// Remove the summary and body rows of one variant
    fn delete_variant(&self, id: &str, alt_label: &str) -> Result<()>;

    /// Flush any pending writes to persistent storage
    fn sync(&self) -> Result<()>;

    /// Close the storage backend
    fn close(&self) -> Result<()>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;
}

/// Storage backend statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of bounding-box rows
    pub geometry_rows: usize,
    /// Number of summary rows
    pub summary_rows: usize,
    /// Number of geometry body rows
    pub body_rows: usize,
    /// Number of write operations performed
    pub operations_count: u64,
}
