//! Configuration for the spatial database.

use crate::error::{PipError, Result};
use serde::de::Error;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Half-width, in degrees, of the rectangle a query point is expanded to
    #[serde(default = "Config::default_probe_epsilon")]
    pub probe_epsilon: f64,

    /// Lifetime of a materialized record in the cache
    #[serde(default = "Config::default_cache_ttl")]
    pub cache_ttl: Duration,

    /// How often expired cache entries are swept
    #[serde(default = "Config::default_cache_sweep_interval")]
    pub cache_sweep_interval: Duration,

    /// Upper bound on candidates tested concurrently per query (`None` = one task each, unbounded)
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Treat a malformed candidate geometry as a query failure
    #[serde(default = "Config::default_strict")]
    pub strict: bool,

    /// Drop cached entries of a record when it is re-indexed
    #[serde(default = "Config::default_invalidate_on_index")]
    pub invalidate_on_index: bool,
}

impl Config {
    const fn default_probe_epsilon() -> f64 {
        0.00001
    }

    const fn default_cache_ttl() -> Duration {
        Duration::from_secs(5 * 60)
    }

    const fn default_cache_sweep_interval() -> Duration {
        Duration::from_secs(30 * 60)
    }

    const fn default_strict() -> bool {
        true
    }

    const fn default_invalidate_on_index() -> bool {
        true
    }

    pub fn with_probe_epsilon(mut self, epsilon: f64) -> Self {
        assert!(
            epsilon.is_finite() && epsilon > 0.0,
            "Probe epsilon must be positive and finite"
        );
        self.probe_epsilon = epsilon;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        assert!(!ttl.is_zero(), "Cache TTL must be greater than zero");
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_sweep_interval(mut self, interval: Duration) -> Self {
        assert!(
            !interval.is_zero(),
            "Cache sweep interval must be greater than zero"
        );
        self.cache_sweep_interval = interval;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        assert!(limit > 0, "Max concurrency must be greater than zero");

        if limit > 10_000 {
            log::warn!(
                "Max concurrency of {} is very large; each in-flight candidate holds \
                a task and its decoded geometry.",
                limit
            );
        }

        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_invalidate_on_index(mut self, invalidate: bool) -> Self {
        self.invalidate_on_index = invalidate;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.probe_epsilon.is_finite() || self.probe_epsilon <= 0.0 {
            return Err("Probe epsilon must be positive and finite".to_string());
        }

        if self.cache_ttl.is_zero() {
            return Err("Cache TTL must be greater than zero".to_string());
        }

        if self.cache_sweep_interval.is_zero() {
            return Err("Cache sweep interval must be greater than zero".to_string());
        }

        if let Some(0) = self.max_concurrency {
            return Err("Max concurrency must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Override settings from URI query parameters.
    ///
    /// Recognised keys: `strict`, `cache_ttl` (seconds), `max_concurrency`,
    /// `probe_epsilon`. Other keys (such as `dsn`) are left to the backend.
    pub fn apply_query_pairs<'a, I>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            match key {
                "strict" => {
                    self.strict = value.parse().map_err(|_| {
                        PipError::Configuration(format!("invalid strict '{}'", value))
                    })?;
                }
                "cache_ttl" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        PipError::Configuration(format!("invalid cache_ttl '{}'", value))
                    })?;
                    self.cache_ttl = Duration::from_secs(secs);
                }
                "max_concurrency" => {
                    let limit: usize = value.parse().map_err(|_| {
                        PipError::Configuration(format!("invalid max_concurrency '{}'", value))
                    })?;
                    self.max_concurrency = Some(limit);
                }
                "probe_epsilon" => {
                    self.probe_epsilon = value.parse().map_err(|_| {
                        PipError::Configuration(format!("invalid probe_epsilon '{}'", value))
                    })?;
                }
                _ => {}
            }
        }

        self.validate().map_err(PipError::Configuration)?;
        Ok(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_epsilon: Self::default_probe_epsilon(),
            cache_ttl: Self::default_cache_ttl(),
            cache_sweep_interval: Self::default_cache_sweep_interval(),
            max_concurrency: None,
            strict: Self::default_strict(),
            invalidate_on_index: Self::default_invalidate_on_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.probe_epsilon, 0.00001);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_sweep_interval, Duration::from_secs(1800));
        assert!(config.strict);
        assert!(config.max_concurrency.is_none());
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let config = Config::from_json(r#"{"strict": false}"#).unwrap();
        assert!(!config.strict);
        assert_eq!(config.probe_epsilon, 0.00001);

        let json = config.to_json().unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_rejects_unknown_and_invalid() {
        assert!(Config::from_json(r#"{"bogus": 1}"#).is_err());
        assert!(Config::from_json(r#"{"max_concurrency": 0}"#).is_err());
    }

    #[test]
    fn test_apply_query_pairs() {
        let config = Config::default()
            .apply_query_pairs([
                ("dsn", "/tmp/x"),
                ("strict", "false"),
                ("cache_ttl", "10"),
                ("max_concurrency", "4"),
            ])
            .unwrap();

        assert!(!config.strict);
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.max_concurrency, Some(4));

        let err = Config::default()
            .apply_query_pairs([("cache_ttl", "soon")])
            .unwrap_err();
        assert!(matches!(err, PipError::Configuration(_)));
    }

    #[test]
    fn test_strict_must_be_a_bool() {
        for value in ["0", "no", "False", ""] {
            let err = Config::default()
                .apply_query_pairs([("strict", value)])
                .unwrap_err();
            assert!(matches!(err, PipError::Configuration(_)));
        }

        let config = Config::default()
            .with_strict(false)
            .apply_query_pairs([("strict", "true")])
            .unwrap();
        assert!(config.strict);
    }

    #[test]
    #[should_panic(expected = "Max concurrency must be greater than zero")]
    fn test_zero_concurrency_panics() {
        let _ = Config::default().with_max_concurrency(0);
    }
}
