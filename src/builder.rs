//! Database builder for flexible configuration
//!
//! The builder picks a backend (in-memory, an append-only file, a URI
//! resolved through a `BackendRegistry`, or an already opened backend) and
//! a `Config`.

use crate::config::Config;
use crate::db::SpatialDatabase;
use crate::error::Result;
use crate::storage::{BackendRegistry, StorageBackend};
#[cfg(feature = "aof")]
use std::path::PathBuf;
use std::sync::Arc;

enum Source {
    Memory,
    #[cfg(feature = "aof")]
    Path(PathBuf),
    Uri(String),
    Backend(Arc<dyn StorageBackend>),
}

/// Builder for `SpatialDatabase`.
pub struct DatabaseBuilder {
    source: Source,
    registry: Option<BackendRegistry>,
    config: Config,
}

impl DatabaseBuilder {
    /// Create a new builder with default in-memory configuration.
    pub fn new() -> Self {
        Self {
            source: Source::Memory,
            registry: None,
            config: Config::default(),
        }
    }

    /// Persist to an append-only file at `path`.
    #[cfg(feature = "aof")]
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source = Source::Path(path.into());
        self
    }

    /// Configure for in-memory storage with no persistence.
    pub fn in_memory(mut self) -> Self {
        self.source = Source::Memory;
        self
    }

    /// Open the backend named by `uri`; its query parameters override the config.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.source = Source::Uri(uri.into());
        self
    }

    /// Resolve URIs through `registry` instead of the default one.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an already opened backend.
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.source = Source::Backend(backend);
        self
    }

    /// Set the database configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the database.
    pub fn build(self) -> Result<SpatialDatabase> {
        match self.source {
            Source::Memory => SpatialDatabase::memory_with_config(self.config),
            #[cfg(feature = "aof")]
            Source::Path(path) => {
                let backend = Arc::new(crate::storage::AOFBackend::open(path)?);
                SpatialDatabase::with_backend(backend, self.config)
            }
            Source::Uri(uri) => {
                let registry = self.registry.unwrap_or_else(BackendRegistry::with_defaults);
                let (backend, config) = registry.open_with_config(&uri, self.config)?;
                SpatialDatabase::with_backend(backend, config)
            }
            Source::Backend(backend) => SpatialDatabase::with_backend(backend, self.config),
        }
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
