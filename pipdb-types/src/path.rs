use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ALT_SEPARATOR: &str = "-alt-";

/// Canonical address of one geometry variant of a record.
///
/// The canonical geometry of record `101` is addressed as `101`, an alternate
/// geometry labelled `quattroshapes` as `101-alt-quattroshapes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPath {
    id: String,
    alt: Option<String>,
}

impl RecordPath {
    /// Path of the canonical geometry of `id`.
    pub fn canonical(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alt: None,
        }
    }

    /// Path of the alternate geometry `label` of `id`.
    pub fn alternate(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alt: Some(label.into()),
        }
    }

    /// Build a path from a storage key, where an empty label means canonical.
    pub fn from_parts(id: impl Into<String>, alt_label: &str) -> Self {
        if alt_label.is_empty() {
            Self::canonical(id)
        } else {
            Self::alternate(id, alt_label)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alt_label(&self) -> Option<&str> {
        self.alt.as_deref()
    }

    /// Alternate label as stored in the record tables (`""` for canonical).
    pub fn storage_label(&self) -> &str {
        self.alt.as_deref().unwrap_or("")
    }

    pub fn is_alternate(&self) -> bool {
        self.alt.is_some()
    }

    /// Key used to deduplicate candidates within one query.
    pub fn dedup_key(&self) -> String {
        format!("{},{}", self.id, self.storage_label())
    }

    /// Relative on-disk location of the source document for this path.
    ///
    /// Numeric ids are split into directories of three digits, so `1234567`
    /// lives at `123/456/7/1234567.geojson`.
    pub fn relative_path(&self) -> String {
        let filename = format!("{}.geojson", self);

        if self.id.is_empty() || !self.id.bytes().all(|b| b.is_ascii_digit()) {
            return filename;
        }

        let chunks: Vec<&str> = self
            .id
            .as_bytes()
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();

        format!("{}/{}", chunks.join("/"), filename)
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alt {
            Some(label) => write!(f, "{}{}{}", self.id, ALT_SEPARATOR, label),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Error returned when a string is not a valid record path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePathError(String);

impl fmt::Display for ParsePathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid record path: {}", self.0)
    }
}

impl std::error::Error for ParsePathError {}

impl FromStr for RecordPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        match s.split_once(ALT_SEPARATOR) {
            Some((id, label)) => {
                if id.is_empty() || label.is_empty() {
                    return Err(ParsePathError(s.to_string()));
                }
                Ok(Self::alternate(id, label))
            }
            None if s.is_empty() => Err(ParsePathError(s.to_string())),
            None => Ok(Self::canonical(s)),
        }
    }
}
