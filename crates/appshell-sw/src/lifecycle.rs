//! Lifecycle coordination: install → activate → steady-state interception.
//!
//! The coordinator contains no polling loop; the host runtime invokes the
//! handlers and awaits the returned futures ("waitUntil" semantics). Event
//! sequencing between install and activate is the host's responsibility,
//! but an activate for a generation that is not yet installed is rejected.

use std::sync::Arc;

use appshell_net::AssetFetcher;
use appshell_store::CacheStorage;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::config::ShellConfig;
use crate::generation::{GcReport, GenerationManager};
use crate::pattern::BypassRules;
use crate::populate::{populate, PopulationReport};
use crate::router::{RequestRouter, RoutedResponse};
use crate::SwError;

/// Phase of the coordinator's own generation.
///
/// A superseded generation has no phase here; it exists only as a namespace
/// pending garbage collection after a newer generation activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No generation opened yet.
    Idle,
    /// Population in progress.
    Installing,
    /// Populated, not yet serving.
    Installed,
    /// Serving request-time lookups.
    Active,
}

/// Lifecycle events, observable by the host.
#[derive(Debug, Clone)]
pub enum ShellEvent {
    /// Install began for a generation.
    InstallStarted { generation: String },
    /// Install finished; the generation is installed but not yet active.
    InstallFinished {
        generation: String,
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
    /// Install aborted; any previously active generation is untouched.
    InstallAborted { generation: String },
    /// A generation became the active one.
    Activated { generation: String },
    /// A stale generation was garbage-collected.
    GenerationDeleted { name: String },
}

/// Coordinates generations, population, and routing for one deployment.
pub struct CacheController {
    config: ShellConfig,
    storage: CacheStorage,
    fetcher: Arc<AssetFetcher>,
    generations: GenerationManager,
    router: RequestRouter,
    phase: RwLock<LifecyclePhase>,
    event_tx: mpsc::UnboundedSender<ShellEvent>,
}

impl CacheController {
    /// Create a controller with a fresh store.
    pub fn new(
        config: ShellConfig,
        fetcher: AssetFetcher,
    ) -> (Self, mpsc::UnboundedReceiver<ShellEvent>) {
        Self::with_storage(config, fetcher, CacheStorage::new())
    }

    /// Create a controller over an existing store.
    ///
    /// Successive deployments share one store: the new controller installs
    /// its own generation alongside the old one and deletes the old one on
    /// activation.
    pub fn with_storage(
        config: ShellConfig,
        fetcher: AssetFetcher,
        storage: CacheStorage,
    ) -> (Self, mpsc::UnboundedReceiver<ShellEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let fetcher = Arc::new(fetcher);

        let generations =
            GenerationManager::new(storage.clone(), &config.cache_prefix, &config.version_tag);
        let router = RequestRouter::new(
            storage.clone(),
            Arc::clone(&fetcher),
            BypassRules::new(config.bypass.clone()),
        );

        (
            Self {
                config,
                storage,
                fetcher,
                generations,
                router,
                phase: RwLock::new(LifecyclePhase::Idle),
                event_tx,
            },
            event_rx,
        )
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> LifecyclePhase {
        *self.phase.read().await
    }

    /// The shared store backend.
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Name of this deployment's generation.
    pub fn generation_name(&self) -> String {
        self.config.generation_name()
    }

    /// Handle the install signal: open this deployment's generation and
    /// populate it from the manifest.
    ///
    /// Per-entry fetch outcomes never fail the install; the generation is
    /// Installed once the pipeline completes. A store-level abort reverts
    /// the phase to Idle. Failed installs are not retried automatically.
    ///
    /// Accepted only from Idle. A controller is bound to one generation, so
    /// an install after activation would re-populate the generation already
    /// serving; a new deployment gets a new controller over the same store
    /// (see [`Self::with_storage`]).
    pub async fn on_install(&self) -> Result<PopulationReport, SwError> {
        {
            let mut phase = self.phase.write().await;
            match *phase {
                LifecyclePhase::Idle => {
                    *phase = LifecyclePhase::Installing;
                }
                other => {
                    return Err(SwError::State(format!(
                        "install signal received in phase {:?}",
                        other
                    )));
                }
            }
        }

        let generation = self.config.generation_name();
        info!(generation = %generation, "Installing");
        let _ = self.event_tx.send(ShellEvent::InstallStarted {
            generation: generation.clone(),
        });

        let result = async {
            self.generations.open_current().await?;
            let report = populate(
                &self.fetcher,
                &self.storage,
                &self.config.origin,
                &self.config.manifest,
                &generation,
            )
            .await?;
            Ok::<_, SwError>(report)
        }
        .await;

        match result {
            Ok(report) => {
                *self.phase.write().await = LifecyclePhase::Installed;
                let _ = self.event_tx.send(ShellEvent::InstallFinished {
                    generation,
                    succeeded: report.succeeded.len(),
                    skipped: report.skipped.len(),
                    failed: report.failed.len(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(generation = %generation, error = %e, "Install aborted");
                *self.phase.write().await = LifecyclePhase::Idle;
                let _ = self
                    .event_tx
                    .send(ShellEvent::InstallAborted { generation });
                Err(e)
            }
        }
    }

    /// Handle the activate signal: promote the installed generation and
    /// garbage-collect stale ones.
    ///
    /// Rejected unless the generation is Installed. Garbage-collection
    /// failures never block activation.
    pub async fn on_activate(&self) -> Result<GcReport, SwError> {
        {
            let phase = self.phase.read().await;
            if *phase != LifecyclePhase::Installed {
                return Err(SwError::State(format!(
                    "activate signal received in phase {:?}",
                    *phase
                )));
            }
        }

        let generation = self.config.generation_name();
        self.storage.set_active(&generation).await?;
        *self.phase.write().await = LifecyclePhase::Active;

        info!(generation = %generation, "Activated");
        let _ = self.event_tx.send(ShellEvent::Activated {
            generation: generation.clone(),
        });

        match self.generations.garbage_collect().await {
            Ok(report) => {
                for name in &report.deleted {
                    let _ = self
                        .event_tx
                        .send(ShellEvent::GenerationDeleted { name: name.clone() });
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Garbage collection failed; activation unaffected");
                Ok(GcReport::default())
            }
        }
    }

    /// Handle an intercepted request.
    pub async fn handle_request(&self, url: &Url) -> Result<RoutedResponse, SwError> {
        self.router.route(url).await
    }
}
