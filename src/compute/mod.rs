//! Ring-set encoding, containment, validation, and GeoJSON conversion.

pub mod geojson;
pub mod rings;
pub mod validation;
