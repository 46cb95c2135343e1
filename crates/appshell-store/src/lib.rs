//! # Appshell Store
//!
//! Generation-namespaced blob storage for the appshell cache manager.
//!
//! ## Features
//!
//! - **Namespaces**: one disjoint key space per cache generation
//! - **Blobs**: opaque response bytes plus status metadata
//! - **Active namespace**: request-time lookups consult exactly one namespace
//! - **Unavailability**: a closed store fails every operation explicitly
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── active namespace name
//!     └── Namespace ("ecotrack-cache-v3")
//!             └── key (absolute URL) → CachedResponse
//! ```

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

// ==================== Errors ====================

/// Errors that can occur in the store backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backing medium is no longer accessible.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Write addressed to a namespace that was never opened.
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A namespace could not be deleted.
    #[error("Failed to delete namespace: {0}")]
    DeleteFailed(String),
}

// ==================== Cached Response ====================

/// A cached response blob: everything needed to reconstruct a response
/// without re-fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Absolute URL the response was fetched from.
    pub url: String,

    /// Response status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CachedResponse {
    /// Create a new blob stamped with the current time.
    pub fn new(url: &str, status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let cached_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            url: url.to_string(),
            status,
            headers,
            body,
            cached_at,
        }
    }
}

// ==================== Namespace ====================

/// A single generation's key space.
#[derive(Debug, Default)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,

    /// Cached entries, keyed by absolute URL.
    entries: HashMap<String, CachedResponse>,
}

impl Namespace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    fn put(&mut self, key: &str, entry: CachedResponse) {
        self.entries.insert(key.to_string(), entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ==================== Cache Storage ====================

/// Process-wide store backend shared by population and request routing.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    namespaces: Arc<RwLock<HashMap<String, Namespace>>>,
    active: Arc<RwLock<Option<String>>>,
    closed: Arc<AtomicBool>,
    delete_faults: Arc<RwLock<HashSet<String>>>,
}

impl CacheStorage {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(
                "backing store has been closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Open a namespace, creating it if absent. Idempotent.
    pub async fn open(&self, name: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let mut namespaces = self.namespaces.write().await;
        if !namespaces.contains_key(name) {
            debug!(namespace = name, "Creating namespace");
            namespaces.insert(name.to_string(), Namespace::new(name));
        }
        Ok(())
    }

    /// Write an entry into a namespace. Overwrites silently on key conflict.
    pub async fn put(
        &self,
        namespace: &str,
        key: &str,
        entry: CachedResponse,
    ) -> Result<(), StoreError> {
        self.check_open()?;
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;
        trace!(namespace, key, body_len = entry.body.len(), "Storing entry");
        ns.put(key, entry);
        Ok(())
    }

    /// Look up a key in the active namespace only.
    ///
    /// Absent key, or no active namespace yet, is `Ok(None)` — a miss is a
    /// normal outcome, not an error.
    pub async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        self.check_open()?;
        let active = self.active.read().await;
        let Some(name) = active.as_deref() else {
            return Ok(None);
        };
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(name).and_then(|ns| ns.get(key)).cloned())
    }

    /// List all namespace names.
    pub async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        self.check_open()?;
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.keys().cloned().collect())
    }

    /// Delete a whole namespace and all its entries.
    ///
    /// Returns `false` if the namespace did not exist. The store does not
    /// protect the active namespace; callers must never pass its name.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        if self.delete_faults.read().await.contains(name) {
            return Err(StoreError::DeleteFailed(name.to_string()));
        }
        let mut namespaces = self.namespaces.write().await;
        let removed = namespaces.remove(name).is_some();
        if removed {
            debug!(namespace = name, "Deleted namespace");
        }
        Ok(removed)
    }

    /// Mark a namespace as the one consulted by `match_key`.
    ///
    /// Replaces any previously active namespace; at most one is active.
    pub async fn set_active(&self, name: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let namespaces = self.namespaces.read().await;
        if !namespaces.contains_key(name) {
            return Err(StoreError::NamespaceNotFound(name.to_string()));
        }
        drop(namespaces);
        let mut active = self.active.write().await;
        debug!(namespace = name, previous = ?*active, "Switching active namespace");
        *active = Some(name.to_string());
        Ok(())
    }

    /// Name of the currently active namespace, if any.
    pub async fn active_namespace(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Number of entries in a namespace, or `None` if it does not exist.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        let namespaces = self.namespaces.read().await;
        namespaces.get(name).map(|ns| ns.len())
    }

    /// Make subsequent deletes of one namespace fail with
    /// [`StoreError::DeleteFailed`], leaving it and its entries in place.
    /// Fault-injection hook for exercising delete-failure isolation.
    pub async fn inject_delete_fault(&self, name: &str) {
        self.delete_faults.write().await.insert(name.to_string());
    }

    /// Detach the backing medium. Every subsequent operation fails with
    /// [`StoreError::Unavailable`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
