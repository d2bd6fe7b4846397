//! Flattened summary records.
//!
//! An `Spr` is the compact projection of a record that queries return and
//! filters evaluate. It never carries geometry.

use crate::path::RecordPath;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tri-state flag: `-1` unknown, `0` false, `1` true on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Existential {
    #[default]
    Unknown,
    False,
    True,
}

impl Existential {
    pub fn as_i64(self) -> i64 {
        match self {
            Existential::Unknown => -1,
            Existential::False => 0,
            Existential::True => 1,
        }
    }

    pub fn is_true(self) -> bool {
        self == Existential::True
    }
}

impl From<bool> for Existential {
    fn from(value: bool) -> Self {
        if value {
            Existential::True
        } else {
            Existential::False
        }
    }
}

impl From<Existential> for i64 {
    fn from(value: Existential) -> Self {
        value.as_i64()
    }
}

impl TryFrom<i64> for Existential {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Existential::Unknown),
            0 => Ok(Existential::False),
            1 => Ok(Existential::True),
            other => Err(format!("invalid existential flag value: {}", other)),
        }
    }
}

impl FromStr for Existential {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-1" | "unknown" => Ok(Existential::Unknown),
            "0" | "false" => Ok(Existential::False),
            "1" | "true" => Ok(Existential::True),
            other => Err(format!("invalid existential flag value: {}", other)),
        }
    }
}

impl fmt::Display for Existential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Flattened summary record for one geometry variant of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spr {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub placetype: String,
    pub country: String,
    pub repo: String,
    /// Relative path of the source document
    pub path: String,
    /// Alternate geometry label, `None` for the canonical geometry
    #[serde(default)]
    pub alt_label: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
    pub is_current: Existential,
    pub is_deprecated: Existential,
    pub is_ceased: Existential,
    pub is_superseded: Existential,
    pub is_superseding: Existential,
    /// Unix timestamp (seconds)
    pub last_modified: i64,
}

impl Spr {
    /// Canonical path of the geometry variant this summary describes.
    pub fn record_path(&self) -> RecordPath {
        match &self.alt_label {
            Some(label) => RecordPath::alternate(self.id.clone(), label.clone()),
            None => RecordPath::canonical(self.id.clone()),
        }
    }

    pub fn is_alternate(&self) -> bool {
        self.alt_label.is_some()
    }
}
