//! Point-in-polygon resolution.
//!
//! A query expands the point to a small probe rectangle, fetches every
//! indexed row whose bounds overlap it, and tests each candidate on its own
//! tokio task. Tasks report back over channels; the collector stops at the
//! first hard error, at caller cancellation, or when every task is done.

use crate::compute::geojson::{geometry_to_geojson, rect_to_feature, spr_to_properties};
use crate::compute::rings::{parse_rings, polygon_contains, probe_rect};
use crate::compute::validation::validate_coordinate;
use crate::config::Config;
use crate::error::{PipError, Result};
use crate::filter::FilterChain;
use crate::records::RecordResolver;
use crate::storage::StorageBackend;
use geo::Coord;
use geojson::{Feature, FeatureCollection};
use parking_lot::RwLock;
use pipdb_types::index::IndexedGeometry;
use pipdb_types::spr::Spr;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Keys (`identity,alt_label`) already emitted by one query.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: RwLock<FxHashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    /// Mark `key` as seen. Returns `false` if it was already marked.
    pub fn mark(&self, key: String) -> bool {
        self.keys.write().insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

/// Summaries of the places containing a query point, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacesResults {
    pub places: Vec<Spr>,
}

impl PlacesResults {
    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.places.iter().map(|spr| spr.id.as_str()).collect()
    }
}

/// Work item for one candidate row.
struct CandidateTask {
    candidate: IndexedGeometry,
    coord: Coord,
    resolver: Arc<RecordResolver>,
    filters: FilterChain,
    seen: Arc<SeenSet>,
    limiter: Option<Arc<Semaphore>>,
    token: CancellationToken,
    results: mpsc::Sender<Spr>,
    errors: mpsc::Sender<PipError>,
    strict: bool,
}

impl CandidateTask {
    async fn run(self) {
        let _permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                _ = self.token.cancelled() => return,
                permit = Arc::clone(limiter).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
            },
            None => None,
        };

        if self.token.is_cancelled() {
            return;
        }

        let key = self.candidate.dedup_key();
        if self.seen.contains(&key) {
            return;
        }

        let path = self.candidate.path();

        let polygon = match parse_rings(&path.to_string(), &self.candidate.body) {
            Ok(polygon) => polygon,
            Err(err) if self.strict => {
                // Only the first error matters; the collector stops listening after it
                let _ = self.errors.try_send(err);
                return;
            }
            Err(err) => {
                log::warn!("Skipping candidate {}: {}", path, err);
                return;
            }
        };

        if !polygon_contains(&polygon, self.coord) {
            return;
        }

        if !self.seen.mark(key) {
            return;
        }

        let record = match self.resolver.resolve(&path) {
            Ok(record) => record,
            Err(err) => {
                log::error!("Failed to resolve {}: {}", path, err);
                return;
            }
        };

        if let Err(rejection) = self.filters.evaluate(&record.summary) {
            log::debug!("Filtered out {}: {}", path, rejection);
            return;
        }

        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.results.send(record.summary.clone()) => {}
        }
    }
}

/// Orchestrates candidate lookup and concurrent containment tests.
pub struct ContainmentResolver {
    backend: Arc<dyn StorageBackend>,
    resolver: Arc<RecordResolver>,
    probe_epsilon: f64,
    max_concurrency: Option<usize>,
    strict: bool,
}

impl ContainmentResolver {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        resolver: Arc<RecordResolver>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            resolver,
            probe_epsilon: config.probe_epsilon,
            max_concurrency: config.max_concurrency,
            strict: config.strict,
        }
    }

    /// Index rows whose bounds overlap the probe rectangle around `coord`.
    pub fn candidates(&self, coord: Coord) -> Result<Vec<IndexedGeometry>> {
        validate_coordinate(&coord)?;
        self.backend
            .query_intersecting(&probe_rect(coord, self.probe_epsilon))
    }

    /// Summaries of every indexed geometry containing `coord` that passes `filters`.
    ///
    /// Returns `Ok(None)` if `token` is cancelled before the query completes.
    pub async fn point_in_polygon(
        &self,
        token: &CancellationToken,
        coord: Coord,
        filters: &FilterChain,
    ) -> Result<Option<PlacesResults>> {
        let started = Instant::now();

        if token.is_cancelled() {
            return Ok(None);
        }

        let candidates = self.candidates(coord)?;
        let candidate_count = candidates.len();

        if candidates.is_empty() {
            return Ok(Some(PlacesResults::default()));
        }

        let query_token = token.child_token();
        // Cancels any task still running once the collector returns
        let _cancel_on_exit = query_token.clone().drop_guard();

        let seen = Arc::new(SeenSet::new());
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let (result_tx, mut result_rx) = mpsc::channel::<Spr>(1);
        let (error_tx, mut error_rx) = mpsc::channel::<PipError>(1);

        let mut tasks = JoinSet::new();
        for candidate in candidates {
            let task = CandidateTask {
                candidate,
                coord,
                resolver: Arc::clone(&self.resolver),
                filters: filters.clone(),
                seen: Arc::clone(&seen),
                limiter: limiter.clone(),
                token: query_token.clone(),
                results: result_tx.clone(),
                errors: error_tx.clone(),
                strict: self.strict,
            };
            tasks.spawn(task.run());
        }

        // The channels close once every task has dropped its senders
        drop(result_tx);
        drop(error_tx);

        let mut places = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    log::debug!("Point in polygon query cancelled after {:?}", started.elapsed());
                    return Ok(None);
                }
                Some(err) = error_rx.recv() => {
                    query_token.cancel();
                    return Err(err);
                }
                received = result_rx.recv() => match received {
                    Some(spr) => places.push(spr),
                    None => break,
                },
            }
        }

        // Every task has finished; an error may still be queued
        if let Ok(err) = error_rx.try_recv() {
            return Err(err);
        }

        // A panicked task may have dropped a match
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined
                && err.is_panic()
            {
                log::error!("Candidate task panicked: {}", err);
                return Err(PipError::Storage(format!("candidate task panicked: {}", err)));
            }
        }

        log::debug!(
            "Point in polygon ({}, {}) matched {} of {} candidates in {:?}",
            coord.x,
            coord.y,
            places.len(),
            candidate_count,
            started.elapsed()
        );

        Ok(Some(PlacesResults { places }))
    }

    /// Candidate rectangles for `coord` as GeoJSON polygons with an `id` property.
    pub async fn point_in_polygon_candidates(
        &self,
        token: &CancellationToken,
        coord: Coord,
    ) -> Result<Option<FeatureCollection>> {
        if token.is_cancelled() {
            return Ok(None);
        }

        let candidates = self.candidates(coord)?;
        let mut features = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            if token.is_cancelled() {
                return Ok(None);
            }
            features.push(rect_to_feature(&candidate.bounds, &candidate.identity));
        }

        Ok(Some(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }))
    }

    /// Project query results into GeoJSON features carrying their cached geometry.
    pub async fn results_to_feature_collection(
        &self,
        token: &CancellationToken,
        results: &PlacesResults,
    ) -> Result<Option<FeatureCollection>> {
        let mut features = Vec::with_capacity(results.len());

        for spr in &results.places {
            if token.is_cancelled() {
                return Ok(None);
            }

            let record = self.resolver.resolve(&spr.record_path())?;
            features.push(Feature {
                bbox: None,
                geometry: Some(geometry_to_geojson(&record.geometry)?),
                id: None,
                properties: Some(spr_to_properties(spr)?),
                foreign_members: None,
            });
        }

        Ok(Some(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RecordCache;
    use crate::compute::geojson::geometry_to_string;
    use crate::compute::rings::index_rows;
    use crate::filter::FilterRejection;
    use crate::filter::FilterResult;
    use crate::storage::{MemoryBackend, StorageStats};
    use geo::{Rect, coord, polygon};
    use pipdb_types::path::RecordPath;
    use pipdb_types::record::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Memory backend that returns `first` ahead of every other candidate.
    struct FrontLoadedBackend {
        inner: Arc<MemoryBackend>,
        first: IndexedGeometry,
    }

    impl StorageBackend for FrontLoadedBackend {
        fn replace_geometries(&self, identity: &str, rows: Vec<IndexedGeometry>) -> Result<()> {
            self.inner.replace_geometries(identity, rows)
        }

        fn alternate_labels(&self, identity: &str) -> Result<Vec<String>> {
            self.inner.alternate_labels(identity)
        }

        fn query_intersecting(&self, rect: &Rect) -> Result<Vec<IndexedGeometry>> {
            let mut rows = vec![self.first.clone()];
            rows.extend(self.inner.query_intersecting(rect)?);
            Ok(rows)
        }

        fn put_summary(&self, spr: &Spr) -> Result<()> {
            self.inner.put_summary(spr)
        }

        fn get_summary(&self, id: &str, alt_label: &str) -> Result<Option<Spr>> {
            self.inner.get_summary(id, alt_label)
        }

        fn put_geometry(&self, id: &str, alt_label: &str, body: &str) -> Result<()> {
            self.inner.put_geometry(id, alt_label, body)
        }

        fn get_geometry(&self, id: &str, alt_label: &str) -> Result<Option<String>> {
            self.inner.get_geometry(id, alt_label)
        }

        fn delete_variant(&self, id: &str, alt_label: &str) -> Result<()> {
            self.inner.delete_variant(id, alt_label)
        }

        fn sync(&self) -> Result<()> {
            self.inner.sync()
        }

        fn close(&self) -> Result<()> {
            self.inner.close()
        }

        fn stats(&self) -> Result<StorageStats> {
            self.inner.stats()
        }
    }

    fn counting_filter(calls: &Arc<AtomicUsize>) -> FilterChain {
        let calls = Arc::clone(calls);
        FilterChain::new().with(move |_: &Spr| -> FilterResult {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn engine(config: &Config) -> (Arc<MemoryBackend>, ContainmentResolver) {
        let backend = Arc::new(MemoryBackend::new());
        let cache = Arc::new(RecordCache::new(Duration::from_secs(60)));
        let resolver = Arc::new(RecordResolver::new(backend.clone(), cache));
        let engine = ContainmentResolver::new(backend.clone(), resolver, config);
        (backend, engine)
    }

    fn index(backend: &MemoryBackend, id: &str, min: f64, max: f64) {
        let geometry = geo::Geometry::Polygon(polygon![
            (x: min, y: min),
            (x: min, y: max),
            (x: max, y: max),
            (x: max, y: min),
            (x: min, y: min),
        ]);
        let path = RecordPath::canonical(id);
        let record = Record::new(id, "region", geometry.clone());

        backend
            .replace_geometries(id, index_rows(&path, &geometry).unwrap())
            .unwrap();
        backend.put_summary(&record.summary(&path, &geometry)).unwrap();
        backend
            .put_geometry(id, "", &geometry_to_string(&geometry).unwrap())
            .unwrap();
    }

    #[test]
    fn test_seen_set_marks_once() {
        let seen = SeenSet::new();
        assert!(!seen.contains("1,"));
        assert!(seen.mark("1,".to_string()));
        assert!(!seen.mark("1,".to_string()));
        assert!(seen.contains("1,"));
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_nested_polygons() {
        let (backend, engine) = engine(&Config::default());
        index(&backend, "outer", 0.0, 10.0);
        index(&backend, "inner", 2.0, 4.0);

        let token = CancellationToken::new();
        let results = engine
            .point_in_polygon(&token, coord! { x: 3.0, y: 3.0 }, &FilterChain::new())
            .await
            .unwrap()
            .unwrap();

        let mut ids = results.ids();
        ids.sort_unstable();
        assert_eq!(ids, vec!["inner", "outer"]);

        let results = engine
            .point_in_polygon(&token, coord! { x: 8.0, y: 8.0 }, &FilterChain::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.ids(), vec!["outer"]);
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let (backend, engine) = engine(&Config::default().with_max_concurrency(1));
        for i in 0..8 {
            index(&backend, &i.to_string(), 0.0, 10.0 + i as f64);
        }

        let token = CancellationToken::new();
        let results = engine
            .point_in_polygon(&token, coord! { x: 5.0, y: 5.0 }, &FilterChain::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.len(), 8);
    }

    #[tokio::test]
    async fn test_filter_rejects() {
        let (backend, engine) = engine(&Config::default());
        index(&backend, "101", 0.0, 10.0);

        let filters = FilterChain::new().with(|spr: &Spr| -> crate::filter::FilterResult {
            if spr.id == "101" {
                Err(FilterRejection::new("excluded"))
            } else {
                Ok(())
            }
        });

        let results = engine
            .point_in_polygon(&CancellationToken::new(), coord! { x: 5.0, y: 5.0 }, &filters)
            .await
            .unwrap()
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_coordinate() {
        let (_, engine) = engine(&Config::default());
        let err = engine
            .point_in_polygon(
                &CancellationToken::new(),
                coord! { x: 0.0, y: 91.0 },
                &FilterChain::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_results_to_feature_collection() {
        let (backend, engine) = engine(&Config::default());
        index(&backend, "101", 0.0, 10.0);

        let token = CancellationToken::new();
        let results = engine
            .point_in_polygon(&token, coord! { x: 5.0, y: 5.0 }, &FilterChain::new())
            .await
            .unwrap()
            .unwrap();

        let collection = engine
            .results_to_feature_collection(&token, &results)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(collection.features.len(), 1);

        let feature = &collection.features[0];
        assert_eq!(feature.properties.as_ref().unwrap()["id"], "101");
        assert!(feature.geometry.is_some());
    }

    #[tokio::test]
    async fn test_panicking_task_fails_query() {
        let (backend, engine) = engine(&Config::default());
        index(&backend, "101", 0.0, 10.0);
        index(&backend, "202", 0.0, 20.0);

        let filters = FilterChain::new().with(|spr: &Spr| -> FilterResult {
            if spr.id == "101" {
                panic!("filter blew up");
            }
            Ok(())
        });

        let err = engine
            .point_in_polygon(&CancellationToken::new(), coord! { x: 5.0, y: 5.0 }, &filters)
            .await
            .unwrap_err();
        assert!(matches!(err, PipError::Storage(_)));
    }

    #[tokio::test]
    async fn test_cancelled_while_collecting() {
        let (backend, engine) = engine(&Config::default().with_max_concurrency(1));
        for i in 0..4 {
            index(&backend, &i.to_string(), 0.0, 10.0 + i as f64);
        }

        let token = CancellationToken::new();
        let trigger = token.clone();
        let filters = FilterChain::new().with(move |_: &Spr| -> FilterResult {
            trigger.cancel();
            Ok(())
        });

        let results = engine
            .point_in_polygon(&token, coord! { x: 5.0, y: 5.0 }, &filters)
            .await
            .unwrap();
        assert!(results.is_none());
    }

    #[tokio::test]
    async fn test_first_error_cancels_remaining_tasks() {
        let inner = Arc::new(MemoryBackend::new());
        for i in 0..20 {
            index(&inner, &i.to_string(), 0.0, 10.0 + i as f64);
        }

        let malformed = IndexedGeometry {
            identity: "bad".to_string(),
            is_alternate: false,
            alt_label: String::new(),
            bounds: Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 }),
            body: "not a ring set".to_string(),
        };
        let backend: Arc<dyn StorageBackend> = Arc::new(FrontLoadedBackend {
            inner,
            first: malformed,
        });
        let cache = Arc::new(RecordCache::new(Duration::from_secs(60)));
        let resolver = Arc::new(RecordResolver::new(Arc::clone(&backend), cache));
        let engine = ContainmentResolver::new(
            backend,
            resolver,
            &Config::default().with_max_concurrency(1),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let err = engine
            .point_in_polygon(
                &CancellationToken::new(),
                coord! { x: 5.0, y: 5.0 },
                &counting_filter(&calls),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipError::MalformedGeometry { .. }));

        // Let any task that survived the error run to completion
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(calls.load(Ordering::SeqCst) < 20);
    }
}
