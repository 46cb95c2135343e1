//! # Appshell SW
//!
//! Offline app-shell cache manager: sits between a client application and the
//! network, serves static assets from a versioned local store, and manages
//! the lifecycle of successive cache generations.
//!
//! ## Features
//!
//! - **Generations**: versioned, disjoint cache namespaces
//! - **Population**: scatter-gather manifest prefetch with partial-failure
//!   tolerance
//! - **Routing**: bypass → cache-first → network
//! - **Lifecycle**: install, activate, steady-state fetch interception
//!
//! ## Architecture
//!
//! ```text
//! CacheController
//!     ├── GenerationManager ── CacheStorage (appshell-store)
//!     ├── populate() ───────── AssetFetcher (appshell-net)
//!     └── RequestRouter
//!             ├── BypassRules
//!             ├── CacheStorage (active generation)
//!             └── AssetFetcher (pass-through)
//! ```

use thiserror::Error;

pub mod config;
pub mod generation;
pub mod lifecycle;
pub mod pattern;
pub mod populate;
pub mod router;

pub use config::ShellConfig;
pub use generation::{GcReport, GenerationManager};
pub use lifecycle::{CacheController, LifecyclePhase, ShellEvent};
pub use pattern::{BypassRules, UrlPattern};
pub use populate::{populate, PopulateError, PopulationReport};
pub use router::{RequestRouter, ResponseSource, RoutedResponse};

use appshell_net::FetchError;
use appshell_store::StoreError;

/// Errors that can occur in the cache manager.
#[derive(Error, Debug)]
pub enum SwError {
    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Lifecycle operation invoked in the wrong phase.
    #[error("State error: {0}")]
    State(String),

    /// Population run aborted.
    #[error(transparent)]
    Population(#[from] PopulateError),

    /// Store backend failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Network failure on a pass-through path.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}
