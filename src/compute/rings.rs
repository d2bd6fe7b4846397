//! Ring-set bodies stored in the bounding-box index and the exact containment test.
//!
//! A body is the JSON array `[[[x, y], ...], ...]`: the first ring is the
//! exterior, any further rings are holes.

use crate::error::{PipError, Result};
use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, Polygon, Rect};
use pipdb_types::index::IndexedGeometry;
use pipdb_types::path::RecordPath;

/// Rectangle a query coordinate is expanded to before hitting the index.
pub fn probe_rect(coord: Coord, epsilon: f64) -> Rect {
    Rect::new(
        Coord {
            x: coord.x - epsilon,
            y: coord.y - epsilon,
        },
        Coord {
            x: coord.x + epsilon,
            y: coord.y + epsilon,
        },
    )
}

/// Inclusive rectangle overlap, the predicate the bounding-box store implements.
pub fn rects_intersect(a: &Rect, b: &Rect) -> bool {
    a.min().x <= b.max().x
        && a.max().x >= b.min().x
        && a.min().y <= b.max().y
        && a.max().y >= b.min().y
}

/// Exact point-in-polygon test. Holes are excluded, boundary points count as inside.
pub fn polygon_contains(polygon: &Polygon, coord: Coord) -> bool {
    polygon.intersects(&coord)
}

/// Serialize a polygon's rings into an index body.
pub fn encode_rings(polygon: &Polygon) -> Result<String> {
    let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect();

    Ok(serde_json::to_string(&rings)?)
}

/// Parse an index body back into a polygon.
///
/// An empty or unparsable body means the index is corrupt and is reported
/// as `MalformedGeometry`.
pub fn parse_rings(path: &str, body: &str) -> Result<Polygon> {
    let malformed = |reason: String| PipError::MalformedGeometry {
        path: path.to_string(),
        reason,
    };

    let rings: Vec<Vec<Vec<f64>>> =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    if rings.is_empty() {
        return Err(malformed("missing coordinates for polygon".to_string()));
    }

    let mut lines = Vec::with_capacity(rings.len());
    for ring in rings {
        let coords = ring
            .into_iter()
            .map(|position| match position.as_slice() {
                [x, y, ..] => Ok(Coord { x: *x, y: *y }),
                _ => Err(malformed(
                    "coordinate must have at least 2 values".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        lines.push(LineString::from(coords));
    }

    let mut lines = lines.into_iter();
    let exterior = lines
        .next()
        .ok_or_else(|| malformed("missing exterior ring".to_string()))?;

    if exterior.0.is_empty() {
        return Err(malformed("empty exterior ring".to_string()));
    }

    Ok(Polygon::new(exterior, lines.collect()))
}

/// Flatten a polygonal geometry into its member polygons.
pub fn polygons(geometry: &Geometry) -> Result<Vec<Polygon>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![polygon.clone()]),
        Geometry::MultiPolygon(multi) => Ok(multi.0.clone()),
        Geometry::Rect(rect) => Ok(vec![rect.to_polygon()]),
        Geometry::GeometryCollection(collection) => {
            let mut out = Vec::new();
            for member in collection.iter() {
                out.extend(polygons(member)?);
            }
            Ok(out)
        }
        _ => Err(PipError::InvalidInput(
            "geometry must be a Polygon or MultiPolygon".to_string(),
        )),
    }
}

/// Bounding-box rows for one geometry variant, one row per member polygon.
pub fn index_rows(path: &RecordPath, geometry: &Geometry) -> Result<Vec<IndexedGeometry>> {
    let polygons = polygons(geometry)?;
    let mut rows = Vec::with_capacity(polygons.len());

    for polygon in polygons {
        let Some(bounds) = polygon.bounding_rect() else {
            return Err(PipError::InvalidInput(format!(
                "geometry for {} has an empty polygon",
                path
            )));
        };

        rows.push(IndexedGeometry {
            identity: path.id().to_string(),
            is_alternate: path.is_alternate(),
            alt_label: path.storage_label().to_string(),
            bounds,
            body: encode_rings(&polygon)?,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, coord, polygon};

    fn square(min: f64, max: f64) -> Polygon {
        polygon![
            (x: min, y: min),
            (x: min, y: max),
            (x: max, y: max),
            (x: max, y: min),
            (x: min, y: min),
        ]
    }

    #[test]
    fn test_probe_rect_symmetric() {
        let rect = probe_rect(coord! { x: 5.0, y: 5.0 }, 0.5);
        assert_eq!(rect.min(), coord! { x: 4.5, y: 4.5 });
        assert_eq!(rect.max(), coord! { x: 5.5, y: 5.5 });
    }

    #[test]
    fn test_rects_intersect_inclusive() {
        let a = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        let touching = Rect::new(coord! { x: 10.0, y: 10.0 }, coord! { x: 11.0, y: 11.0 });
        let disjoint = Rect::new(coord! { x: 10.1, y: 0.0 }, coord! { x: 11.0, y: 1.0 });

        assert!(rects_intersect(&a, &touching));
        assert!(!rects_intersect(&a, &disjoint));
    }

    #[test]
    fn test_encode_parse_keeps_holes() {
        let mut poly = square(0.0, 10.0);
        poly.interiors_push(square(4.0, 6.0).exterior().clone());

        let body = encode_rings(&poly).unwrap();
        let parsed = parse_rings("101", &body).unwrap();

        assert_eq!(parsed, poly);
        assert!(polygon_contains(&parsed, coord! { x: 2.0, y: 2.0 }));
        assert!(!polygon_contains(&parsed, coord! { x: 5.0, y: 5.0 }));
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        for body in ["", "[]", "[[]]", "[[[1]]]", "not json"] {
            let err = parse_rings("101", body).unwrap_err();
            assert!(err.is_index_integrity(), "body {:?} gave {:?}", body, err);
        }
    }

    #[test]
    fn test_contains_boundary_and_outside() {
        let poly = square(0.0, 10.0);
        assert!(polygon_contains(&poly, coord! { x: 5.0, y: 5.0 }));
        assert!(polygon_contains(&poly, coord! { x: 0.0, y: 5.0 }));
        assert!(!polygon_contains(&poly, coord! { x: 50.0, y: 50.0 }));
    }

    #[test]
    fn test_index_rows_per_member_polygon() {
        let multi = Geometry::MultiPolygon(MultiPolygon(vec![square(0.0, 1.0), square(5.0, 6.0)]));
        let rows = index_rows(&RecordPath::alternate("7", "osm"), &multi).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_alternate && r.alt_label == "osm"));
        assert_eq!(rows[1].min_x(), 5.0);
        assert_eq!(rows[1].max_y(), 6.0);
    }

    #[test]
    fn test_index_rows_rejects_points() {
        let point = Geometry::Point(geo::Point::new(1.0, 1.0));
        assert!(index_rows(&RecordPath::canonical("1"), &point).is_err());
    }
}
