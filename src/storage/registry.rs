//! Scheme to backend constructor map used when opening a database by URI.
//!
//! ```
//! use pipdb::storage::BackendRegistry;
//!
//! let registry = BackendRegistry::with_defaults();
//! let (backend, config) = registry.open("memory://?strict=false").unwrap();
//! assert!(!config.strict);
//! assert_eq!(backend.stats().unwrap().geometry_rows, 0);
//! ```

use super::{MemoryBackend, StorageBackend};
use crate::config::Config;
use crate::error::{PipError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Builds a backend from a parsed URI and the effective configuration.
pub type BackendConstructor = fn(&Url, &Config) -> Result<Arc<dyn StorageBackend>>;

/// Explicit registry of storage backends, keyed by URI scheme.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `memory` and, when compiled in, `aof`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", open_memory);
        #[cfg(feature = "aof")]
        registry.register("aof", open_aof);
        registry
    }

    /// Register (or replace) the constructor for `scheme`.
    pub fn register(&mut self, scheme: &str, constructor: BackendConstructor) -> &mut Self {
        self.constructors
            .insert(scheme.to_ascii_lowercase(), constructor);
        self
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Open a backend from `uri` using default configuration.
    pub fn open(&self, uri: &str) -> Result<(Arc<dyn StorageBackend>, Config)> {
        self.open_with_config(uri, Config::default())
    }

    /// Open a backend from `uri`; query parameters override `config`.
    pub fn open_with_config(
        &self,
        uri: &str,
        config: Config,
    ) -> Result<(Arc<dyn StorageBackend>, Config)> {
        let url = Url::parse(uri)
            .map_err(|e| PipError::Configuration(format!("invalid URI '{}': {}", uri, e)))?;

        let constructor = self.constructors.get(url.scheme()).ok_or_else(|| {
            PipError::Configuration(format!("unknown backend scheme '{}'", url.scheme()))
        })?;

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let config =
            config.apply_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let backend = constructor(&url, &config)?;
        log::debug!("Opened '{}' storage backend", url.scheme());
        Ok((backend, config))
    }
}

/// Value of the required `dsn` query parameter.
pub fn dsn(url: &Url) -> Result<String> {
    url.query_pairs()
        .find(|(key, _)| key == "dsn")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PipError::Configuration("Missing 'dsn' parameter".to_string()))
}

fn open_memory(_url: &Url, _config: &Config) -> Result<Arc<dyn StorageBackend>> {
    Ok(Arc::new(MemoryBackend::new()))
}

#[cfg(feature = "aof")]
fn open_aof(url: &Url, _config: &Config) -> Result<Arc<dyn StorageBackend>> {
    let path = dsn(url)?;
    Ok(Arc::new(super::AOFBackend::open(path)?))
}
