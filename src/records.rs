//! Cache-then-store materialization of records.

use crate::cache::RecordCache;
use crate::compute::geojson::geometry_from_str;
use crate::error::{PipError, Result};
use crate::storage::StorageBackend;
use pipdb_types::path::{ParsePathError, RecordPath};
use pipdb_types::spr::Spr;
use std::sync::Arc;

/// A materialized record: its flattened summary and precise geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord {
    pub summary: Spr,
    pub geometry: geo::Geometry,
}

pub struct RecordResolver {
    backend: Arc<dyn StorageBackend>,
    cache: Arc<RecordCache>,
}

impl RecordResolver {
    pub fn new(backend: Arc<dyn StorageBackend>, cache: Arc<RecordCache>) -> Self {
        Self { backend, cache }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// Materialize the record at `path`, consulting the cache first.
    pub fn resolve(&self, path: &RecordPath) -> Result<Arc<CachedRecord>> {
        let key = path.to_string();

        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let id = path.id();
        let label = path.storage_label();

        let summary = self
            .backend
            .get_summary(id, label)?
            .ok_or_else(|| PipError::NotFound(format!("summary for {}", key)))?;

        let body = self
            .backend
            .get_geometry(id, label)?
            .ok_or_else(|| PipError::NotFound(format!("geometry for {}", key)))?;

        let geometry = geometry_from_str(&body).map_err(|e| PipError::Decode {
            path: key.clone(),
            reason: e.to_string(),
        })?;

        let record = Arc::new(CachedRecord { summary, geometry });
        self.cache.insert(key, Arc::clone(&record), None);
        Ok(record)
    }

    /// Resolve a path given in its string form (`id` or `id-alt-label`).
    pub fn resolve_str(&self, path: &str) -> Result<Arc<CachedRecord>> {
        let path: RecordPath = path
            .parse()
            .map_err(|e: ParsePathError| PipError::InvalidInput(e.to_string()))?;
        self.resolve(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use geo::polygon;
    use pipdb_types::record::Record;
    use std::time::Duration;

    fn resolver() -> (Arc<MemoryBackend>, RecordResolver) {
        let backend = Arc::new(MemoryBackend::new());
        let cache = Arc::new(RecordCache::new(Duration::from_secs(60)));
        let resolver = RecordResolver::new(backend.clone(), cache);
        (backend, resolver)
    }

    #[test]
    fn test_resolve_populates_cache() {
        let (backend, resolver) = resolver();
        let geometry = geo::Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 0.0, y: 1.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0),
        ]);
        let path = RecordPath::canonical("7");
        let record = Record::new("7", "county", geometry.clone());

        backend.put_summary(&record.summary(&path, &geometry)).unwrap();
        backend
            .put_geometry("7", "", &crate::compute::geojson::geometry_to_string(&geometry).unwrap())
            .unwrap();

        let first = resolver.resolve(&path).unwrap();
        assert_eq!(first.geometry, geometry);
        assert_eq!(first.summary.placetype, "county");

        let second = resolver.resolve_str("7").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cache().stats().hits, 1);
    }

    #[test]
    fn test_missing_rows_not_found() {
        let (_, resolver) = resolver();
        assert!(matches!(
            resolver.resolve(&RecordPath::canonical("404")),
            Err(PipError::NotFound(_))
        ));
    }

    #[test]
    fn test_bad_body_is_decode_error() {
        let (backend, resolver) = resolver();
        let geometry = geo::Geometry::Point(geo::point!(x: 0.0, y: 0.0));
        let path = RecordPath::alternate("8", "osm");
        let record = Record::new("8", "county", geometry.clone());

        backend.put_summary(&record.summary(&path, &geometry)).unwrap();
        backend.put_geometry("8", "osm", "not json").unwrap();

        assert!(matches!(
            resolver.resolve(&path),
            Err(PipError::Decode { .. })
        ));
    }
}
