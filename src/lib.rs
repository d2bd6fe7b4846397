//! Point-in-polygon spatial database over a gazetteer of places.
//!
//! ## Features
//! - **Bounding-box index**: R*-tree over every polygon of every record, alternate geometries included
//! - **Exact containment**: candidates are tested concurrently on tokio tasks, holes respected
//! - **Deduplication**: each `(id, alternate label)` is returned at most once per query
//! - **Record cache**: materialized summaries and geometries expire a fixed time after insertion
//! - **Filters**: composable predicates over flattened summaries, buildable from request parameters
//! - **Persistence**: append-only file (AOF) backend, opened by URI
//!
//! ```rust
//! use pipdb::prelude::*;
//! use geo::{coord, polygon};
//!
//! let db = SpatialDatabase::memory()?;
//! let square = polygon![
//!     (x: 0.0, y: 0.0),
//!     (x: 0.0, y: 10.0),
//!     (x: 10.0, y: 10.0),
//!     (x: 10.0, y: 0.0),
//!     (x: 0.0, y: 0.0),
//! ];
//! db.index_record(&Record::new("101", "region", square.into()))?;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let token = CancellationToken::new();
//! let results = runtime
//!     .block_on(db.point_in_polygon(&token, coord! { x: 5.0, y: 5.0 }, &FilterChain::new()))?
//!     .expect("not cancelled");
//! assert_eq!(results.ids(), vec!["101"]);
//! # Ok::<(), pipdb::PipError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod query;
pub mod records;
pub mod storage;

pub use builder::DatabaseBuilder;
pub use cache::{CacheStats, RecordCache};
pub use config::Config;
pub use db::{DatabaseStats, IndexingGuard, SpatialDatabase};
pub use error::{PipError, Result};
pub use filter::{
    AlternateGeometryMode, Filter, FilterChain, FilterRejection, FilterResult, SprFilter,
};
pub use query::{PlacesResults, SeenSet};
pub use records::CachedRecord;

pub use compute::validation;

#[cfg(feature = "aof")]
pub use storage::{AOFBackend, AOFCommand};
pub use storage::{BackendRegistry, MemoryBackend, StorageBackend, StorageStats};

pub use pipdb_types::index::IndexedGeometry;
pub use pipdb_types::path::RecordPath;
pub use pipdb_types::record::{AlternateGeometry, Record};
pub use pipdb_types::spr::{Existential, Spr};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{DatabaseBuilder, PipError, Result, SpatialDatabase};

    pub use crate::{Config, FilterChain, FilterRejection, PlacesResults, SprFilter};

    pub use crate::{Existential, Record, RecordPath, Spr};

    pub use crate::{MemoryBackend, StorageBackend};

    pub use tokio_util::sync::CancellationToken;

    pub use std::time::Duration;
}
