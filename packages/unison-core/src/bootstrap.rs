//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Catalog accounts are
//! authorized here, before anything listens, so a rejected credential stops
//! startup instead of surfacing later as failed resolutions.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::catalog::{CatalogChain, CatalogSource, HttpCatalogSource};
use crate::error::{UnisonError, UnisonResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{MediaResolver, SessionCoordinator};
use crate::state::{Config, QueueSnapshot};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// The shared playback session.
    pub session: Arc<SessionCoordinator>,
    /// Event bridge for emitting events to WebSocket listeners.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Task spawner for background commands.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// Validated configuration.
    pub config: Arc<Config>,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    ///
    /// Stops the server, background commands and downloads, closes listener
    /// sockets, then performs the opt-in snapshot save and media purge.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to the server and all background commands
        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        // Downloads see the same token; none may rename into place after this
        self.session.resolver().wait_idle().await;

        if self.config.save_snapshot_on_shutdown {
            if let Some(path) = &self.config.snapshot_path {
                let snapshot = QueueSnapshot {
                    tracks: self.session.queue_tracks(),
                };
                match snapshot.save(path) {
                    Ok(()) => log::info!(
                        "[Bootstrap] Saved {} queued track(s) to {}",
                        snapshot.tracks.len(),
                        path.display()
                    ),
                    Err(e) => log::error!("[Bootstrap] Failed to save snapshot: {}", e),
                }
            }
        }

        if self.config.purge_media_on_shutdown {
            if let Err(e) = self.session.resolver().purge().await {
                log::error!("[Bootstrap] Failed to purge media: {}", e);
            }
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for all catalog communication.
///
/// Using a shared client enables connection pooling across accounts.
fn create_http_client() -> UnisonResult<Client> {
    Client::builder()
        .user_agent(concat!("unison/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UnisonError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Authorizes every configured account, in priority order.
///
/// # Errors
///
/// Returns [`UnisonError::Configuration`] naming the first account whose
/// credential is rejected or cannot be checked.
async fn authorize_accounts(config: &Config, client: &Client) -> UnisonResult<CatalogChain> {
    let request_timeout = Duration::from_secs(config.catalog_request_timeout_secs);
    let mut sources: Vec<Arc<dyn CatalogSource>> = Vec::with_capacity(config.accounts.len());

    for account in &config.accounts {
        let source = HttpCatalogSource::authorize(
            client.clone(),
            &config.catalog_base_url,
            &account.label,
            &account.token,
            request_timeout,
        )
        .await
        .map_err(|e| {
            UnisonError::Configuration(format!("catalog account '{}': {}", account.label, e))
        })?;
        sources.push(Arc::new(source));
    }

    Ok(CatalogChain::new(sources))
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Validate configuration
/// 2. Shared HTTP client and catalog authorization (one source per account)
/// 3. Everything else, via [`bootstrap_with_catalog`]
///
/// # Errors
///
/// Returns [`UnisonError::Configuration`] for invalid settings or a rejected
/// catalog credential.
pub async fn bootstrap_services(config: &Config) -> UnisonResult<BootstrappedServices> {
    config.validate().map_err(UnisonError::Configuration)?;

    let http_client = create_http_client()?;
    let catalog = authorize_accounts(config, &http_client).await?;
    log::info!(
        "[Bootstrap] Authorized {} catalog account(s): {:?}",
        catalog.len(),
        catalog.labels()
    );

    bootstrap_with_catalog(config, catalog)
}

/// Wires the session around an already-authorized catalog chain.
///
/// 1. Cancellation token and task spawner
/// 2. Media resolver (creates the media directory)
/// 3. Event bridge (optionally mirrored into the log)
/// 4. Session coordinator, seeded from the startup snapshot
/// 5. Connection manager
///
/// # Errors
///
/// Returns [`UnisonError::Configuration`] if the media directory cannot be
/// created.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn bootstrap_with_catalog(
    config: &Config,
    catalog: CatalogChain,
) -> UnisonResult<BootstrappedServices> {
    let cancel_token = CancellationToken::new();
    let spawner = TokioSpawner::current(cancel_token.child_token());

    std::fs::create_dir_all(&config.media_dir).map_err(|e| {
        UnisonError::Configuration(format!(
            "cannot create media directory {}: {}",
            config.media_dir.display(),
            e
        ))
    })?;
    let resolver = Arc::new(
        MediaResolver::new(
            &config.media_dir,
            catalog.clone(),
            Duration::from_secs(config.resolve_timeout_secs),
        )
        .with_shutdown(cancel_token.child_token()),
    );

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    if config.log_events {
        event_bridge.set_mirror(Arc::new(LoggingEventEmitter));
    }

    let seed = config
        .snapshot_path
        .as_deref()
        .map(QueueSnapshot::load)
        .unwrap_or_default();

    let session = Arc::new(
        SessionCoordinator::new(
            resolver,
            catalog,
            Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        )
        .with_queue(seed.tracks),
    );

    Ok(BootstrappedServices {
        session,
        event_bridge,
        ws_manager: Arc::new(WsConnectionManager::new()),
        spawner,
        cancel_token,
        config: Arc::new(config.clone()),
    })
}
