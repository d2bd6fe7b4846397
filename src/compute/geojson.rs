//! GeoJSON conversion for geometries, summaries, and source records.

use crate::error::{PipError, Result};
use geo::{Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use geojson::{Feature, Geometry as GeoJsonGeometry, JsonObject, JsonValue, Value};
use pipdb_types::record::Record;
use pipdb_types::spr::{Existential, Spr};

fn ring_to_positions(ring: &LineString) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_to_rings(polygon: &Polygon) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_to_positions)
        .collect()
}

fn positions_to_ring(positions: &[Vec<f64>]) -> Result<LineString> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(PipError::InvalidInput(
                "Coordinate must have at least 2 values".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Err(PipError::InvalidInput(
            "Polygon must have at least one ring".to_string(),
        ));
    };

    let interiors = interiors
        .iter()
        .map(|ring| positions_to_ring(ring))
        .collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(positions_to_ring(exterior)?, interiors))
}

/// Converts a `geo` geometry into a GeoJSON geometry.
pub fn geometry_to_geojson(geometry: &geo::Geometry) -> Result<GeoJsonGeometry> {
    let value = match geometry {
        geo::Geometry::Point(point) => Value::Point(vec![point.x(), point.y()]),
        geo::Geometry::Polygon(polygon) => Value::Polygon(polygon_to_rings(polygon)),
        geo::Geometry::MultiPolygon(multi) => {
            Value::MultiPolygon(multi.0.iter().map(polygon_to_rings).collect())
        }
        geo::Geometry::Rect(rect) => Value::Polygon(polygon_to_rings(&rect.to_polygon())),
        geo::Geometry::GeometryCollection(collection) => Value::GeometryCollection(
            collection
                .iter()
                .map(geometry_to_geojson)
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => {
            return Err(PipError::InvalidInput(
                "Unsupported geometry type for GeoJSON output".to_string(),
            ));
        }
    };

    Ok(GeoJsonGeometry::new(value))
}

/// Converts a GeoJSON geometry into a `geo` geometry.
pub fn geometry_from_geojson(geometry: &GeoJsonGeometry) -> Result<geo::Geometry> {
    match &geometry.value {
        Value::Point(coords) => match coords.as_slice() {
            [x, y, ..] => Ok(geo::Geometry::Point(Point::new(*x, *y))),
            _ => Err(PipError::InvalidInput(
                "Point must have at least 2 coordinates".to_string(),
            )),
        },
        Value::Polygon(rings) => Ok(geo::Geometry::Polygon(rings_to_polygon(rings)?)),
        Value::MultiPolygon(polygons) => {
            let polygons = polygons
                .iter()
                .map(|rings| rings_to_polygon(rings))
                .collect::<Result<Vec<_>>>()?;
            Ok(geo::Geometry::MultiPolygon(MultiPolygon(polygons)))
        }
        Value::GeometryCollection(members) => {
            let members = members
                .iter()
                .map(geometry_from_geojson)
                .collect::<Result<Vec<_>>>()?;
            Ok(geo::Geometry::GeometryCollection(members.into()))
        }
        _ => Err(PipError::InvalidInput(
            "GeoJSON geometry is not a Point, Polygon, or MultiPolygon".to_string(),
        )),
    }
}

/// Parses a GeoJSON geometry string.
pub fn geometry_from_str(body: &str) -> Result<geo::Geometry> {
    let geometry: GeoJsonGeometry = serde_json::from_str(body)
        .map_err(|e| PipError::InvalidInput(format!("Failed to parse GeoJSON: {}", e)))?;
    geometry_from_geojson(&geometry)
}

/// Serializes a geometry to a GeoJSON string.
pub fn geometry_to_string(geometry: &geo::Geometry) -> Result<String> {
    let geometry = geometry_to_geojson(geometry)?;
    serde_json::to_string(&geometry)
        .map_err(|e| PipError::Serialization(format!("Failed to serialize geometry: {}", e)))
}

/// A rectangle as a Polygon feature carrying only an `id` property.
///
/// The ring runs south-west, north-west, north-east, south-east, south-west.
pub fn rect_to_feature(rect: &Rect, id: &str) -> Feature {
    let (min, max) = (rect.min(), rect.max());
    let ring = vec![
        vec![min.x, min.y],
        vec![min.x, max.y],
        vec![max.x, max.y],
        vec![max.x, min.y],
        vec![min.x, min.y],
    ];

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), JsonValue::String(id.to_string()));

    Feature {
        bbox: None,
        geometry: Some(GeoJsonGeometry::new(Value::Polygon(vec![ring]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Summary attributes as a GeoJSON properties object.
pub fn spr_to_properties(spr: &Spr) -> Result<JsonObject> {
    match serde_json::to_value(spr)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(PipError::Serialization(
            "Summary did not serialize to an object".to_string(),
        )),
    }
}

fn string_property(properties: &JsonObject, key: &str) -> Option<String> {
    match properties.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn existential_property(properties: &JsonObject, key: &str) -> Result<Existential> {
    match properties.get(key) {
        None | Some(JsonValue::Null) => Ok(Existential::Unknown),
        Some(JsonValue::Bool(b)) => Ok(Existential::from(*b)),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .ok_or_else(|| PipError::InvalidInput(format!("{} must be an integer", key)))
            .and_then(|v| Existential::try_from(v).map_err(PipError::InvalidInput)),
        Some(JsonValue::String(s)) => s.parse().map_err(PipError::InvalidInput),
        Some(_) => Err(PipError::InvalidInput(format!(
            "{} must be a number, boolean, or string",
            key
        ))),
    }
}

/// Builds an indexable record from a GeoJSON feature.
///
/// The id is read from the `id` property, falling back to the feature id.
/// Alternate geometries are attached separately with `Record::with_alternate`.
pub fn record_from_feature(feature: &Feature) -> Result<Record> {
    let empty = JsonObject::new();
    let properties = feature.properties.as_ref().unwrap_or(&empty);

    let id = string_property(properties, "id")
        .or_else(|| match &feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s.clone()),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => None,
        })
        .ok_or_else(|| PipError::InvalidInput("Feature has no id".to_string()))?;

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| PipError::InvalidInput(format!("Feature {} has no geometry", id)))?;
    let geometry = geometry_from_geojson(geometry)?;

    let placetype = string_property(properties, "placetype").unwrap_or_default();
    let mut record = Record::new(id, placetype, geometry)
        .with_current(existential_property(properties, "is_current")?)
        .with_deprecated(existential_property(properties, "is_deprecated")?)
        .with_ceased(existential_property(properties, "is_ceased")?)
        .with_superseded(existential_property(properties, "is_superseded")?)
        .with_superseding(existential_property(properties, "is_superseding")?);

    if let Some(parent_id) = string_property(properties, "parent_id") {
        record = record.with_parent_id(parent_id);
    }
    if let Some(name) = string_property(properties, "name") {
        record = record.with_name(name);
    }
    if let Some(country) = string_property(properties, "country") {
        record = record.with_country(country);
    }
    if let Some(repo) = string_property(properties, "repo") {
        record = record.with_repo(repo);
    }
    if let Some(last_modified) = properties.get("last_modified").and_then(JsonValue::as_i64) {
        record = record.with_last_modified(last_modified);
    }

    let latitude = properties.get("latitude").and_then(JsonValue::as_f64);
    let longitude = properties.get("longitude").and_then(JsonValue::as_f64);
    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        record = record.with_centroid(Point::new(lon, lat));
    }

    Ok(record)
}
