use crate::path::RecordPath;
use geo::Rect;
use serde::{Deserialize, Serialize};

/// One bounding-box index row.
///
/// A multi-polygon geometry is indexed as one row per member polygon, so
/// several rows may share the same `(identity, alt_label)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedGeometry {
    /// Primary id of the record
    pub identity: String,
    pub is_alternate: bool,
    /// Alternate label, empty for the canonical geometry
    pub alt_label: String,
    /// Minimal rectangle enclosing `body`
    pub bounds: Rect,
    /// Ring set encoded as `[[[x, y], ...], ...]`, exterior ring first
    pub body: String,
}

impl IndexedGeometry {
    pub fn path(&self) -> RecordPath {
        if self.is_alternate {
            RecordPath::alternate(self.identity.clone(), self.alt_label.clone())
        } else {
            RecordPath::canonical(self.identity.clone())
        }
    }

    /// Key used to deduplicate candidates within one query.
    pub fn dedup_key(&self) -> String {
        format!("{},{}", self.identity, self.alt_label)
    }

    pub fn min_x(&self) -> f64 {
        self.bounds.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.bounds.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.bounds.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.bounds.max().y
    }
}
