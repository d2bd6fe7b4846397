use geo::{Rect, coord, polygon};
use pipdb::prelude::*;
use pipdb::{IndexedGeometry, RecordCache, StorageStats};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory backend that counts summary and geometry fetches.
struct CountingBackend {
    inner: MemoryBackend,
    summary_fetches: AtomicUsize,
    geometry_fetches: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            summary_fetches: AtomicUsize::new(0),
            geometry_fetches: AtomicUsize::new(0),
        }
    }

    fn fetches(&self) -> (usize, usize) {
        (
            self.summary_fetches.load(Ordering::SeqCst),
            self.geometry_fetches.load(Ordering::SeqCst),
        )
    }
}

impl StorageBackend for CountingBackend {
    fn replace_geometries(&self, identity: &str, rows: Vec<IndexedGeometry>) -> pipdb::Result<()> {
        self.inner.replace_geometries(identity, rows)
    }

    fn alternate_labels(&self, identity: &str) -> pipdb::Result<Vec<String>> {
        self.inner.alternate_labels(identity)
    }

    fn query_intersecting(&self, rect: &Rect) -> pipdb::Result<Vec<IndexedGeometry>> {
        self.inner.query_intersecting(rect)
    }

    fn put_summary(&self, spr: &Spr) -> pipdb::Result<()> {
        self.inner.put_summary(spr)
    }

    fn get_summary(&self, id: &str, alt_label: &str) -> pipdb::Result<Option<Spr>> {
        self.summary_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_summary(id, alt_label)
    }

    fn put_geometry(&self, id: &str, alt_label: &str, body: &str) -> pipdb::Result<()> {
        self.inner.put_geometry(id, alt_label, body)
    }

    fn get_geometry(&self, id: &str, alt_label: &str) -> pipdb::Result<Option<String>> {
        self.geometry_fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_geometry(id, alt_label)
    }

    fn delete_variant(&self, id: &str, alt_label: &str) -> pipdb::Result<()> {
        self.inner.delete_variant(id, alt_label)
    }

    fn sync(&self) -> pipdb::Result<()> {
        self.inner.sync()
    }

    fn close(&self) -> pipdb::Result<()> {
        self.inner.close()
    }

    fn stats(&self) -> pipdb::Result<StorageStats> {
        self.inner.stats()
    }
}

fn region(id: &str) -> Record {
    Record::new(
        id,
        "region",
        polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ]
        .into(),
    )
}

fn database(config: Config) -> (Arc<CountingBackend>, SpatialDatabase) {
    let backend = Arc::new(CountingBackend::new());
    let db = SpatialDatabase::with_backend(backend.clone(), config).unwrap();
    (backend, db)
}

#[test]
fn test_resolve_twice_within_ttl_fetches_once() {
    let (backend, db) = database(Config::default());
    db.index_record(&region("101")).unwrap();

    let path = RecordPath::canonical("101");
    let first = db.get_record(&path).unwrap();
    let second = db.get_record(&path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(backend.fetches(), (1, 1));

    let stats = db.stats().unwrap().cache;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[test]
fn test_resolve_after_expiry_refetches() {
    let (backend, db) =
        database(Config::default().with_cache_ttl(Duration::from_millis(20)));
    db.index_record(&region("101")).unwrap();

    let path = RecordPath::canonical("101");
    db.get_record(&path).unwrap();
    assert_eq!(backend.fetches(), (1, 1));

    std::thread::sleep(Duration::from_millis(40));

    db.get_record(&path).unwrap();
    assert_eq!(backend.fetches(), (2, 2));
}

#[tokio::test]
async fn test_repeated_queries_hit_cache() {
    let (backend, db) = database(Config::default());
    db.index_record(&region("101")).unwrap();

    for _ in 0..5 {
        let results = db
            .point_in_polygon(
                &CancellationToken::new(),
                coord! { x: 5.0, y: 5.0 },
                &FilterChain::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.ids(), vec!["101"]);
    }

    assert_eq!(backend.fetches(), (1, 1));
}

#[test]
fn test_reindex_without_invalidation_serves_stale_entry() {
    let (_, db) = database(Config::default().with_invalidate_on_index(false));
    let path = RecordPath::canonical("101");

    db.index_record(&region("101").with_name("Before")).unwrap();
    assert_eq!(db.get_record(&path).unwrap().summary.name, "Before");

    db.index_record(&region("101").with_name("After")).unwrap();
    assert_eq!(db.get_record(&path).unwrap().summary.name, "Before");
}

#[test]
fn test_reindex_invalidates_alternates() {
    let (backend, db) = database(Config::default());
    let record = region("101").with_alternate(
        "osm",
        polygon![(x: 1.0, y: 1.0), (x: 1.0, y: 9.0), (x: 9.0, y: 9.0), (x: 1.0, y: 1.0)].into(),
    );
    db.index_record(&record).unwrap();

    db.get_record(&RecordPath::alternate("101", "osm")).unwrap();
    db.index_record(&record).unwrap();
    db.get_record(&RecordPath::alternate("101", "osm")).unwrap();

    assert_eq!(backend.fetches(), (2, 2));
}

#[test]
fn test_cache_ttl_override() {
    let cache = RecordCache::new(Duration::from_secs(300));
    let db = SpatialDatabase::memory().unwrap();
    db.index_record(&region("101")).unwrap();
    let record = db.get_record(&RecordPath::canonical("101")).unwrap();

    cache.insert("101", record, Some(Duration::from_millis(10)));
    assert!(cache.get("101").is_some());

    std::thread::sleep(Duration::from_millis(20));
    assert!(cache.get("101").is_none());
    assert_eq!(cache.cleanup_expired(), 1);
}

#[tokio::test]
async fn test_huge_ttl_from_uri() {
    let db = SpatialDatabase::open(&format!("memory://?cache_ttl={}", u64::MAX)).unwrap();
    db.index_record(&region("101")).unwrap();

    let results = db
        .point_in_polygon(
            &CancellationToken::new(),
            coord! { x: 5.0, y: 5.0 },
            &FilterChain::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(results.ids(), vec!["101"]);
    assert_eq!(db.get_record(&RecordPath::canonical("101")).unwrap().summary.id, "101");
}
