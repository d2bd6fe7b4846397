//! # pipdb-types
//!
//! Core data types shared by the pipdb point-in-polygon engine.
//!
//! - **Records**: `Record` and `AlternateGeometry`, the indexing input
//! - **Summaries**: `Spr`, the flattened attribute projection returned by queries
//! - **Paths**: `RecordPath`, the canonical `id` / `id-alt-label` addressing scheme
//! - **Index rows**: `IndexedGeometry`, one bounding-box row per polygon
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use pipdb_types::path::RecordPath;
//!
//! let path: RecordPath = "101-alt-quattroshapes".parse().unwrap();
//! assert_eq!(path.id(), "101");
//! assert_eq!(path.alt_label(), Some("quattroshapes"));
//! ```

pub mod index;
pub mod path;
pub mod record;
pub mod spr;
