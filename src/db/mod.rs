//! The spatial database facade.
//!
//! `SpatialDatabase` wires a storage backend, the record cache and the
//! containment resolver together behind the public query and indexing API.

use crate::builder::DatabaseBuilder;
use crate::cache::{CacheStats, RecordCache};
use crate::compute::geojson::{geometry_to_string, record_from_feature};
use crate::compute::rings::index_rows;
use crate::compute::validation::validate_record_keys;
use crate::config::Config;
use crate::error::{PipError, Result};
use crate::filter::FilterChain;
use crate::query::{ContainmentResolver, PlacesResults};
use crate::records::{CachedRecord, RecordResolver};
use crate::storage::{BackendRegistry, MemoryBackend, StorageBackend, StorageStats};
use geo::Coord;
use geojson::{Feature, FeatureCollection};
use pipdb_types::path::RecordPath;
use pipdb_types::record::Record;
use std::borrow::Borrow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

mod indexing;

pub use indexing::{IndexingGuard, IndexingState};

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseStats {
    pub storage: StorageStats,
    pub cache: CacheStats,
    pub indexing: bool,
}

/// Point-in-polygon database over a gazetteer of records.
///
/// Cloning is cheap and every clone shares the same backend and cache.
/// Queries and index writes may run concurrently.
#[derive(Clone)]
pub struct SpatialDatabase {
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) cache: Arc<RecordCache>,
    pub(crate) resolver: Arc<RecordResolver>,
    pub(crate) engine: Arc<ContainmentResolver>,
    pub(crate) indexing: Arc<IndexingState>,
    pub(crate) closed: Arc<AtomicBool>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) config: Config,
}

impl SpatialDatabase {
    /// Open a database from a URI such as `memory://` or `aof://?dsn=/path/to/index.aof`.
    pub fn open(uri: &str) -> Result<Self> {
        Self::open_with_config(uri, Config::default())
    }

    /// Open a database from a URI; URI query parameters override `config`.
    pub fn open_with_config(uri: &str, config: Config) -> Result<Self> {
        let (backend, config) = BackendRegistry::with_defaults().open_with_config(uri, config)?;
        Self::with_backend(backend, config)
    }

    /// Create an in-memory database with default configuration.
    pub fn memory() -> Result<Self> {
        Self::memory_with_config(Config::default())
    }

    /// Create an in-memory database with custom configuration.
    pub fn memory_with_config(config: Config) -> Result<Self> {
        Self::with_backend(Arc::new(MemoryBackend::new()), config)
    }

    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Build a database on an already opened backend.
    ///
    /// The expired-entry sweeper only starts when called inside a tokio
    /// runtime; without one, expired entries are still ignored on read.
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: Config) -> Result<Self> {
        config.validate().map_err(PipError::Configuration)?;

        let cache = Arc::new(RecordCache::new(config.cache_ttl));
        let resolver = Arc::new(RecordResolver::new(Arc::clone(&backend), Arc::clone(&cache)));
        let engine = Arc::new(ContainmentResolver::new(
            Arc::clone(&backend),
            Arc::clone(&resolver),
            &config,
        ));

        let shutdown = CancellationToken::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            cache.spawn_sweeper(config.cache_sweep_interval, shutdown.child_token());
        } else {
            log::debug!("No tokio runtime; cache sweeper not started");
        }

        Ok(Self {
            backend,
            cache,
            resolver,
            engine,
            indexing: Arc::new(IndexingState::new()),
            closed: Arc::new(AtomicBool::new(false)),
            shutdown,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PipError::DatabaseClosed);
        }
        Ok(())
    }

    /// Index every geometry variant of a record.
    ///
    /// Writes bounding-box rows, then summaries, then geometry bodies, then
    /// drops the summary and body of any alternate the record no longer
    /// carries. The writes are not atomic: a failure part way leaves the
    /// earlier tables updated, and re-indexing the record repairs it.
    ///
    /// With `invalidate_on_index`, cached variants are evicted both before
    /// and after the writes. A query that read the old rows before the first
    /// write may still cache them after the second eviction; that entry lives
    /// until its TTL runs out.
    pub fn index_record(&self, record: &Record) -> Result<()> {
        self.ensure_open()?;
        validate_record_keys(record)?;

        let variants = record.variants();

        // Encode everything before the first write
        let mut rows = Vec::new();
        let mut bodies = Vec::with_capacity(variants.len());
        for (path, geometry) in &variants {
            rows.extend(index_rows(path, geometry)?);
            bodies.push(geometry_to_string(geometry)?);
        }

        let dropped: Vec<String> = self
            .backend
            .alternate_labels(&record.id)?
            .into_iter()
            .filter(|label| !record.alternates.iter().any(|alt| &alt.label == label))
            .collect();

        if self.config.invalidate_on_index {
            self.cache.invalidate_identity(&record.id);
        }

        self.backend.replace_geometries(&record.id, rows)?;

        for (path, geometry) in &variants {
            self.backend.put_summary(&record.summary(path, geometry))?;
        }

        for ((path, _), body) in variants.iter().zip(&bodies) {
            self.backend
                .put_geometry(path.id(), path.storage_label(), body)?;
        }

        for label in &dropped {
            self.backend.delete_variant(&record.id, label)?;
        }

        if self.config.invalidate_on_index {
            self.cache.invalidate_identity(&record.id);
        }

        Ok(())
    }

    /// Index a GeoJSON feature.
    pub fn index_feature(&self, feature: &Feature) -> Result<()> {
        self.index_record(&record_from_feature(feature)?)
    }

    /// Index many records, raising the indexing gate for the duration.
    ///
    /// Stops at the first failure; records before it stay indexed.
    pub fn index_records<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Borrow<Record>,
    {
        self.ensure_open()?;
        let _guard = self.indexing.begin();

        let mut count = 0;
        for record in records {
            self.index_record(record.borrow())?;
            count += 1;
        }

        log::debug!("Indexed {} records", count);
        Ok(count)
    }

    /// Raise the indexing gate for an external crawl.
    pub fn begin_indexing(&self) -> IndexingGuard {
        self.indexing.begin()
    }

    /// Whether a bulk index run is in progress; transports reject queries meanwhile.
    pub fn is_indexing(&self) -> bool {
        self.indexing.is_indexing()
    }

    /// Records whose geometry contains `coord` and that pass `filters`.
    ///
    /// Returns `Ok(None)` when `token` is cancelled first.
    pub async fn point_in_polygon(
        &self,
        token: &CancellationToken,
        coord: Coord,
        filters: &FilterChain,
    ) -> Result<Option<PlacesResults>> {
        self.ensure_open()?;
        self.engine.point_in_polygon(token, coord, filters).await
    }

    /// Raw bounding-box candidates for `coord` as a feature collection.
    pub async fn point_in_polygon_candidates(
        &self,
        token: &CancellationToken,
        coord: Coord,
    ) -> Result<Option<FeatureCollection>> {
        self.ensure_open()?;
        self.engine.point_in_polygon_candidates(token, coord).await
    }

    pub async fn results_to_feature_collection(
        &self,
        token: &CancellationToken,
        results: &PlacesResults,
    ) -> Result<Option<FeatureCollection>> {
        self.ensure_open()?;
        self.engine
            .results_to_feature_collection(token, results)
            .await
    }

    /// Materialize one record, through the cache.
    pub fn get_record(&self, path: &RecordPath) -> Result<Arc<CachedRecord>> {
        self.ensure_open()?;
        self.resolver.resolve(path)
    }

    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.backend.sync()
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.ensure_open()?;
        Ok(DatabaseStats {
            storage: self.backend.stats()?,
            cache: self.cache.stats(),
            indexing: self.is_indexing(),
        })
    }

    /// Close the database. Later calls on any clone return `DatabaseClosed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        self.cache.clear();
        self.backend.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
