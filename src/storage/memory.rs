//! In-memory storage backend with an R*-tree bounding-box index.

use super::{StorageBackend, StorageStats};
use crate::error::Result;
use dashmap::DashMap;
use geo::Rect;
use parking_lot::RwLock;
use pipdb_types::index::IndexedGeometry;
use pipdb_types::path::RecordPath;
use pipdb_types::spr::Spr;
use rstar::{AABB, RTree, RTreeObject};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounding-box row wrapper for the R*-tree.
#[derive(Debug, Clone, PartialEq)]
struct IndexedBBox {
    row: Arc<IndexedGeometry>,
}

impl RTreeObject for IndexedBBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.row.min_x(), self.row.min_y()],
            [self.row.max_x(), self.row.max_y()],
        )
    }
}

#[derive(Default)]
struct GeometryIndex {
    tree: RTree<IndexedBBox>,
    // Map from identity to its rows for replacement on re-index
    by_identity: FxHashMap<String, Vec<IndexedBBox>>,
}

/// In-memory storage backend
pub struct MemoryBackend {
    geometries: RwLock<GeometryIndex>,
    summaries: DashMap<RecordPath, Spr>,
    bodies: DashMap<RecordPath, String>,
    operations: AtomicU64,
}

impl MemoryBackend {
    /// Create a new in-memory storage backend
    pub fn new() -> Self {
        Self {
            geometries: RwLock::new(GeometryIndex::default()),
            summaries: DashMap::new(),
            bodies: DashMap::new(),
            operations: AtomicU64::new(0),
        }
    }

    /// Rebuild the R*-tree in one pass from a full row set.
    ///
    /// Used after replaying a log, where inserting row by row is wasteful.
    pub(crate) fn bulk_load(&self, rows: FxHashMap<String, Vec<IndexedGeometry>>) {
        let mut by_identity = FxHashMap::default();
        let mut all = Vec::new();

        for (identity, rows) in rows {
            let wrapped: Vec<IndexedBBox> = rows
                .into_iter()
                .map(|row| IndexedBBox { row: Arc::new(row) })
                .collect();
            all.extend(wrapped.iter().cloned());
            by_identity.insert(identity, wrapped);
        }

        let mut index = self.geometries.write();
        index.tree = RTree::bulk_load(all);
        index.by_identity = by_identity;
    }

    /// Copy out every table, used when compacting a log.
    pub(crate) fn dump(&self) -> TableDump {
        let geometries = self
            .geometries
            .read()
            .by_identity
            .iter()
            .map(|(identity, rows)| {
                let rows = rows.iter().map(|bbox| (*bbox.row).clone()).collect();
                (identity.clone(), rows)
            })
            .collect();

        TableDump {
            geometries,
            summaries: self.summaries.iter().map(|e| e.value().clone()).collect(),
            bodies: self
                .bodies
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}

/// Full contents of the three tables.
pub(crate) struct TableDump {
    pub geometries: Vec<(String, Vec<IndexedGeometry>)>,
    pub summaries: Vec<Spr>,
    pub bodies: Vec<(RecordPath, String)>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn replace_geometries(&self, identity: &str, rows: Vec<IndexedGeometry>) -> Result<()> {
        let wrapped: Vec<IndexedBBox> = rows
            .into_iter()
            .map(|row| IndexedBBox { row: Arc::new(row) })
            .collect();

        let mut index = self.geometries.write();

        if let Some(old) = index.by_identity.remove(identity) {
            for bbox in &old {
                index.tree.remove(bbox);
            }
        }

        for bbox in &wrapped {
            index.tree.insert(bbox.clone());
        }

        if !wrapped.is_empty() {
            index.by_identity.insert(identity.to_string(), wrapped);
        }

        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn alternate_labels(&self, identity: &str) -> Result<Vec<String>> {
        let index = self.geometries.read();
        let mut labels: Vec<String> = index
            .by_identity
            .get(identity)
            .map(|rows| {
                rows.iter()
                    .filter(|bbox| bbox.row.is_alternate)
                    .map(|bbox| bbox.row.alt_label.clone())
                    .collect()
            })
            .unwrap_or_default();
        labels.sort();
        labels.dedup();
        Ok(labels)
    }

    fn query_intersecting(&self, rect: &Rect) -> Result<Vec<IndexedGeometry>> {
        let envelope = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );

        let index = self.geometries.read();
        Ok(index
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|bbox| (*bbox.row).clone())
            .collect())
    }

    fn put_summary(&self, spr: &Spr) -> Result<()> {
        self.summaries.insert(spr.record_path(), spr.clone());
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get_summary(&self, id: &str, alt_label: &str) -> Result<Option<Spr>> {
        let key = RecordPath::from_parts(id, alt_label);
        Ok(self.summaries.get(&key).map(|v| v.clone()))
    }

    fn put_geometry(&self, id: &str, alt_label: &str, body: &str) -> Result<()> {
        self.bodies
            .insert(RecordPath::from_parts(id, alt_label), body.to_string());
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get_geometry(&self, id: &str, alt_label: &str) -> Result<Option<String>> {
        let key = RecordPath::from_parts(id, alt_label);
        Ok(self.bodies.get(&key).map(|v| v.clone()))
    }

    fn delete_variant(&self, id: &str, alt_label: &str) -> Result<()> {
        let key = RecordPath::from_parts(id, alt_label);
        self.summaries.remove(&key);
        self.bodies.remove(&key);
        self.operations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut index = self.geometries.write();
        *index = GeometryIndex::default();
        self.summaries.clear();
        self.bodies.clear();
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            geometry_rows: self.geometries.read().tree.size(),
            summary_rows: self.summaries.len(),
            body_rows: self.bodies.len(),
            operations_count: self.operations.load(Ordering::Relaxed),
        })
    }
}
