//! Generation management: naming, creation, and garbage collection of
//! versioned cache namespaces.

use appshell_store::{CacheStorage, StoreError};
use tracing::{debug, info, warn};

/// Result of a garbage-collection sweep.
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    /// Namespaces deleted.
    pub deleted: Vec<String>,
    /// Namespaces that failed to delete. Failures are isolated; they never
    /// abort the sweep.
    pub failed: Vec<String>,
}

/// Owns the mapping from the configured version tag to the current
/// generation namespace.
pub struct GenerationManager {
    storage: CacheStorage,
    cache_prefix: String,
    version_tag: String,
}

impl GenerationManager {
    /// Create a new generation manager.
    pub fn new(storage: CacheStorage, cache_prefix: &str, version_tag: &str) -> Self {
        Self {
            storage,
            cache_prefix: cache_prefix.to_string(),
            version_tag: version_tag.to_string(),
        }
    }

    /// Name of the current generation. Pure function of the configured tag.
    pub fn current_generation_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.version_tag)
    }

    /// Open the current generation namespace, creating it if absent.
    pub async fn open_current(&self) -> Result<String, StoreError> {
        let name = self.current_generation_name();
        self.storage.open(&name).await?;
        Ok(name)
    }

    /// Delete every namespace that carries this manager's prefix and is not
    /// the current generation.
    ///
    /// Namespaces outside the prefix are never touched; unrelated caches may
    /// share the backend. Only the initial enumeration can fail — per-name
    /// delete failures are logged and reported, not propagated.
    pub async fn garbage_collect(&self) -> Result<GcReport, StoreError> {
        let current = self.current_generation_name();
        let names = self.storage.list_namespaces().await?;

        let mut report = GcReport::default();
        for name in names {
            if !name.starts_with(&self.cache_prefix) || name == current {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    info!(namespace = %name, "Deleted stale generation");
                    report.deleted.push(name);
                }
                Ok(false) => {
                    // Raced with another deletion; nothing left to do.
                    debug!(namespace = %name, "Stale generation already gone");
                }
                Err(e) => {
                    warn!(namespace = %name, error = %e, "Failed to delete stale generation");
                    report.failed.push(name);
                }
            }
        }
        Ok(report)
    }
}
