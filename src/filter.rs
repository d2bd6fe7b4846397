//! Filter chains evaluated against flattened summaries.
//!
//! A query emits a candidate only if every filter in its chain accepts the
//! candidate's `Spr`. Closures can be used directly as filters:
//!
//! ```
//! use pipdb::filter::{FilterChain, FilterRejection, FilterResult};
//! use pipdb_types::spr::Spr;
//!
//! let chain = FilterChain::new().with(|spr: &Spr| -> FilterResult {
//!     if spr.country == "US" {
//!         Ok(())
//!     } else {
//!         Err(FilterRejection::new("not in the US"))
//!     }
//! });
//! assert_eq!(chain.len(), 1);
//! ```

use crate::error::{PipError, Result};
use pipdb_types::spr::{Existential, Spr};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A filter declined a summary. Not an error: the candidate is just skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected: {reason}")]
pub struct FilterRejection {
    pub reason: String,
}

impl FilterRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of evaluating a filter.
pub type FilterResult = std::result::Result<(), FilterRejection>;

/// Predicate over a flattened summary.
pub trait Filter: Send + Sync {
    fn evaluate(&self, spr: &Spr) -> FilterResult;
}

impl<F> Filter for F
where
    F: Fn(&Spr) -> FilterResult + Send + Sync,
{
    fn evaluate(&self, spr: &Spr) -> FilterResult {
        self(spr)
    }
}

/// Ordered filters; the first rejection wins. An empty chain accepts everything.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.push(filter);
        self
    }

    pub fn push<F: Filter + 'static>(&mut self, filter: F) {
        self.filters.push(Arc::new(filter));
    }

    pub fn push_arc(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn evaluate(&self, spr: &Spr) -> FilterResult {
        self.filters.iter().try_for_each(|filter| filter.evaluate(spr))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Which geometry variants a query should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlternateGeometryMode {
    /// Canonical geometries only
    #[default]
    Default,
    /// Alternate geometries only
    Alternate,
    Any,
}

impl std::str::FromStr for AlternateGeometryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(Self::Default),
            "alternate" | "alt" => Ok(Self::Alternate),
            "all" | "any" => Ok(Self::Any),
            other => Err(format!("invalid geometries value: {}", other)),
        }
    }
}

/// Standard summary filter built from request parameters.
///
/// Each existential constraint is the set of accepted values; an empty set
/// accepts anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SprFilter {
    pub placetypes: HashSet<String>,
    pub is_current: HashSet<Existential>,
    pub is_deprecated: HashSet<Existential>,
    pub is_ceased: HashSet<Existential>,
    pub is_superseded: HashSet<Existential>,
    pub is_superseding: HashSet<Existential>,
    pub geometries: AlternateGeometryMode,
}

impl SprFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placetype(mut self, placetype: impl Into<String>) -> Self {
        self.placetypes.insert(placetype.into());
        self
    }

    pub fn with_is_current(mut self, value: Existential) -> Self {
        self.is_current.insert(value);
        self
    }

    pub fn with_is_deprecated(mut self, value: Existential) -> Self {
        self.is_deprecated.insert(value);
        self
    }

    pub fn with_is_ceased(mut self, value: Existential) -> Self {
        self.is_ceased.insert(value);
        self
    }

    pub fn with_is_superseded(mut self, value: Existential) -> Self {
        self.is_superseded.insert(value);
        self
    }

    pub fn with_is_superseding(mut self, value: Existential) -> Self {
        self.is_superseding.insert(value);
        self
    }

    pub fn with_geometries(mut self, mode: AlternateGeometryMode) -> Self {
        self.geometries = mode;
        self
    }

    /// Build a filter from `key=value` request parameters.
    ///
    /// Recognised keys are `placetype`, `is_current`, `is_deprecated`,
    /// `is_ceased`, `is_superseded`, `is_superseding` and `geometries`.
    /// Values may be comma separated and keys repeated. Unknown keys are
    /// ignored so the same parameters can carry transport options.
    pub fn from_query<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filter = Self::new();

        for (key, value) in pairs {
            let values = value.split(',').map(str::trim).filter(|v| !v.is_empty());

            match key {
                "placetype" => filter.placetypes.extend(values.map(str::to_string)),
                "is_current" => parse_flags(key, values, &mut filter.is_current)?,
                "is_deprecated" => parse_flags(key, values, &mut filter.is_deprecated)?,
                "is_ceased" => parse_flags(key, values, &mut filter.is_ceased)?,
                "is_superseded" => parse_flags(key, values, &mut filter.is_superseded)?,
                "is_superseding" => parse_flags(key, values, &mut filter.is_superseding)?,
                "geometries" => {
                    filter.geometries = value
                        .parse()
                        .map_err(PipError::InvalidInput)?;
                }
                _ => {}
            }
        }

        Ok(filter)
    }

    /// Wrap into a single-filter chain.
    pub fn into_chain(self) -> FilterChain {
        FilterChain::new().with(self)
    }
}

fn parse_flags<'a>(
    key: &str,
    values: impl Iterator<Item = &'a str>,
    into: &mut HashSet<Existential>,
) -> Result<()> {
    for value in values {
        let flag: Existential = value
            .parse()
            .map_err(|e: String| PipError::InvalidInput(format!("{}: {}", key, e)))?;
        into.insert(flag);
    }
    Ok(())
}

fn check_flag(
    name: &str,
    accepted: &HashSet<Existential>,
    actual: Existential,
) -> FilterResult {
    if accepted.is_empty() || accepted.contains(&actual) {
        Ok(())
    } else {
        Err(FilterRejection::new(format!("{} is {}", name, actual)))
    }
}

impl Filter for SprFilter {
    fn evaluate(&self, spr: &Spr) -> FilterResult {
        if !self.placetypes.is_empty() && !self.placetypes.contains(&spr.placetype) {
            return Err(FilterRejection::new(format!(
                "placetype {} not allowed",
                spr.placetype
            )));
        }

        check_flag("is_current", &self.is_current, spr.is_current)?;
        check_flag("is_deprecated", &self.is_deprecated, spr.is_deprecated)?;
        check_flag("is_ceased", &self.is_ceased, spr.is_ceased)?;
        check_flag("is_superseded", &self.is_superseded, spr.is_superseded)?;
        check_flag("is_superseding", &self.is_superseding, spr.is_superseding)?;

        match (self.geometries, spr.is_alternate()) {
            (AlternateGeometryMode::Default, true) => {
                Err(FilterRejection::new("alternate geometry"))
            }
            (AlternateGeometryMode::Alternate, false) => {
                Err(FilterRejection::new("canonical geometry"))
            }
            _ => Ok(()),
        }
    }
}
