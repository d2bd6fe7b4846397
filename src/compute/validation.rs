//! Validation for query coordinates and record keys.

use crate::error::{PipError, Result};
use geo::Coord;
use pipdb_types::record::Record;
use rustc_hash::FxHashSet;

const ALT_SEPARATOR: &str = "-alt-";

/// Validates a coordinate has a finite, in-range longitude (x) and latitude (y).
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
///
/// # Examples
///
/// ```
/// use pipdb::compute::validation::validate_coordinate;
/// use geo::coord;
///
/// assert!(validate_coordinate(&coord! { x: -122.38, y: 37.61 }).is_ok());
/// assert!(validate_coordinate(&coord! { x: 200.0, y: 40.0 }).is_err());
/// assert!(validate_coordinate(&coord! { x: -74.0, y: 95.0 }).is_err());
/// ```
pub fn validate_coordinate(coord: &Coord) -> Result<()> {
    let (x, y) = (coord.x, coord.y);

    if !x.is_finite() {
        return Err(PipError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            x
        )));
    }

    if !y.is_finite() {
        return Err(PipError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            y
        )));
    }

    if !(-180.0..=180.0).contains(&x) {
        return Err(PipError::InvalidInput(format!(
            "Longitude must be between -180 and 180, got: {}",
            x
        )));
    }

    if !(-90.0..=90.0).contains(&y) {
        return Err(PipError::InvalidInput(format!(
            "Latitude must be between -90 and 90, got: {}",
            y
        )));
    }

    Ok(())
}

/// Validates that every variant of `record` maps to its own storage key.
///
/// The id must be non-empty. Alternate labels must be non-empty and unique
/// within the record. Neither may contain the `-alt-` separator, or the
/// variant's path would not parse back to the same key.
pub fn validate_record_keys(record: &Record) -> Result<()> {
    if record.id.is_empty() {
        return Err(PipError::InvalidInput("Record id must not be empty".to_string()));
    }

    if record.id.contains(ALT_SEPARATOR) {
        return Err(PipError::InvalidInput(format!(
            "Record id must not contain '{}', got: {}",
            ALT_SEPARATOR, record.id
        )));
    }

    let mut seen = FxHashSet::default();
    for alt in &record.alternates {
        if alt.label.is_empty() {
            return Err(PipError::InvalidInput(format!(
                "Alternate geometry of {} has an empty label",
                record.id
            )));
        }

        if alt.label.contains(ALT_SEPARATOR) {
            return Err(PipError::InvalidInput(format!(
                "Alternate label must not contain '{}', got: {}",
                ALT_SEPARATOR, alt.label
            )));
        }

        if !seen.insert(alt.label.as_str()) {
            return Err(PipError::InvalidInput(format!(
                "Duplicate alternate label '{}' on {}",
                alt.label, record.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, coord, polygon};

    #[test]
    fn test_rejects_non_finite() {
        assert!(validate_coordinate(&coord! { x: f64::NAN, y: 0.0 }).is_err());
        assert!(validate_coordinate(&coord! { x: 0.0, y: f64::INFINITY }).is_err());
    }

    #[test]
    fn test_accepts_edges() {
        assert!(validate_coordinate(&coord! { x: 180.0, y: -90.0 }).is_ok());
        assert!(validate_coordinate(&coord! { x: -180.0, y: 90.0 }).is_ok());
    }

    fn square() -> Geometry {
        polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 1.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)].into()
    }

    #[test]
    fn test_record_keys() {
        let record = Record::new("101", "region", square());
        assert!(validate_record_keys(&record).is_ok());
        assert!(validate_record_keys(&record.clone().with_alternate("osm", square())).is_ok());

        let invalid = [
            Record::new("", "region", square()),
            Record::new("1-alt-2", "region", square()),
            record.clone().with_alternate("", square()),
            record.clone().with_alternate("a-alt-b", square()),
            record
                .clone()
                .with_alternate("osm", square())
                .with_alternate("osm", square()),
        ];
        for record in &invalid {
            assert!(matches!(
                validate_record_keys(record),
                Err(PipError::InvalidInput(_))
            ));
        }
    }
}
