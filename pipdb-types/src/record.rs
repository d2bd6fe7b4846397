use crate::path::RecordPath;
use crate::spr::{Existential, Spr};
use geo::{BoundingRect, Centroid, Geometry, Point};
use serde::{Deserialize, Serialize};

/// A secondary geometry for the same place, e.g. another source's boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternateGeometry {
    pub label: String,
    pub geometry: Geometry,
}

/// A gazetteer record as handed to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub placetype: String,
    pub country: String,
    pub repo: String,
    /// Canonical geometry (Polygon or MultiPolygon)
    pub geometry: Geometry,
    /// Label centroid; derived from the geometry when absent
    pub centroid: Option<Point>,
    pub is_current: Existential,
    pub is_deprecated: Existential,
    pub is_ceased: Existential,
    pub is_superseded: Existential,
    pub is_superseding: Existential,
    pub last_modified: i64,
    pub alternates: Vec<AlternateGeometry>,
}

impl Record {
    pub fn new(id: impl Into<String>, placetype: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            parent_id: "-1".to_string(),
            name: String::new(),
            placetype: placetype.into(),
            country: String::new(),
            repo: String::new(),
            geometry,
            centroid: None,
            is_current: Existential::Unknown,
            is_deprecated: Existential::Unknown,
            is_ceased: Existential::Unknown,
            is_superseded: Existential::Unknown,
            is_superseding: Existential::Unknown,
            last_modified: 0,
            alternates: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn with_centroid(mut self, centroid: Point) -> Self {
        self.centroid = Some(centroid);
        self
    }

    pub fn with_current(mut self, flag: Existential) -> Self {
        self.is_current = flag;
        self
    }

    pub fn with_deprecated(mut self, flag: Existential) -> Self {
        self.is_deprecated = flag;
        self
    }

    pub fn with_ceased(mut self, flag: Existential) -> Self {
        self.is_ceased = flag;
        self
    }

    pub fn with_superseded(mut self, flag: Existential) -> Self {
        self.is_superseded = flag;
        self
    }

    pub fn with_superseding(mut self, flag: Existential) -> Self {
        self.is_superseding = flag;
        self
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn with_alternate(mut self, label: impl Into<String>, geometry: Geometry) -> Self {
        self.alternates.push(AlternateGeometry {
            label: label.into(),
            geometry,
        });
        self
    }

    /// Every geometry variant of the record, canonical first.
    pub fn variants(&self) -> Vec<(RecordPath, &Geometry)> {
        let mut variants = Vec::with_capacity(1 + self.alternates.len());
        variants.push((RecordPath::canonical(self.id.clone()), &self.geometry));

        for alt in &self.alternates {
            variants.push((
                RecordPath::alternate(self.id.clone(), alt.label.clone()),
                &alt.geometry,
            ));
        }

        variants
    }

    /// Flattened summary for one variant of this record.
    ///
    /// Bounds and centroid come from `geometry`; the explicit centroid only
    /// applies to the canonical variant.
    pub fn summary(&self, path: &RecordPath, geometry: &Geometry) -> Spr {
        let bounds = geometry.bounding_rect();

        let centroid = match (path.is_alternate(), self.centroid) {
            (false, Some(point)) => Some(point),
            _ => geometry.centroid(),
        };
        let (longitude, latitude) = centroid.map(|p| (p.x(), p.y())).unwrap_or((0.0, 0.0));

        let (min_longitude, min_latitude, max_longitude, max_latitude) = bounds
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
            .unwrap_or((0.0, 0.0, 0.0, 0.0));

        Spr {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            name: self.name.clone(),
            placetype: self.placetype.clone(),
            country: self.country.clone(),
            repo: self.repo.clone(),
            path: path.relative_path(),
            alt_label: path.alt_label().map(str::to_string),
            latitude,
            longitude,
            min_latitude,
            min_longitude,
            max_latitude,
            max_longitude,
            is_current: self.is_current,
            is_deprecated: self.is_deprecated,
            is_ceased: self.is_ceased,
            is_superseded: self.is_superseded,
            is_superseding: self.is_superseding,
            last_modified: self.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(min: f64, max: f64) -> Geometry {
        Geometry::Polygon(polygon![
            (x: min, y: min),
            (x: min, y: max),
            (x: max, y: max),
            (x: max, y: min),
            (x: min, y: min),
        ])
    }

    #[test]
    fn test_variants_canonical_first() {
        let record = Record::new("101", "region", square(0.0, 10.0))
            .with_alternate("osm", square(1.0, 9.0));

        let variants = record.variants();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].0.to_string(), "101");
        assert_eq!(variants[1].0.to_string(), "101-alt-osm");
    }

    #[test]
    fn test_summary_bounds_and_centroid() {
        let record = Record::new("101", "region", square(0.0, 10.0)).with_name("Square");
        let (path, geometry) = &record.variants()[0];
        let spr = record.summary(path, geometry);

        assert_eq!(spr.name, "Square");
        assert_eq!(spr.min_longitude, 0.0);
        assert_eq!(spr.max_latitude, 10.0);
        assert!((spr.latitude - 5.0).abs() < 1e-9);
        assert!((spr.longitude - 5.0).abs() < 1e-9);
        assert_eq!(spr.alt_label, None);
    }

    #[test]
    fn test_explicit_centroid_only_for_canonical() {
        let record = Record::new("101", "region", square(0.0, 10.0))
            .with_centroid(Point::new(1.0, 2.0))
            .with_alternate("osm", square(0.0, 4.0));

        let variants = record.variants();
        let canonical = record.summary(&variants[0].0, variants[0].1);
        let alternate = record.summary(&variants[1].0, variants[1].1);

        assert_eq!((canonical.longitude, canonical.latitude), (1.0, 2.0));
        assert!((alternate.longitude - 2.0).abs() < 1e-9);
        assert_eq!(alternate.alt_label.as_deref(), Some("osm"));
    }
}
