//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the session services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::BroadcastEventBridge;
use crate::protocol_constants::{PORT_RANGE_END, PORT_RANGE_START};
use crate::runtime::TokioSpawner;
use crate::services::SessionCoordinator;
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// The shared playback session.
    pub session: Arc<SessionCoordinator>,
    /// Event bridge sockets subscribe to.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Runs commands that may wait on a download.
    pub spawner: TokioSpawner,
    /// Application configuration.
    pub config: Arc<Config>,
    /// Stops the server when cancelled.
    pub cancel_token: CancellationToken,
}

impl AppState {
    /// Builds API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices) -> Self {
        Self {
            session: Arc::clone(&services.session),
            event_bridge: Arc::clone(&services.event_bridge),
            ws_manager: Arc::clone(&services.ws_manager),
            spawner: services.spawner.clone(),
            config: Arc::clone(&services.config),
            cancel_token: services.cancel_token.clone(),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port, or the first free port in the default range.
pub async fn bind_listener(
    preferred_port: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, tokio::net::TcpListener::bind(&addr).await?))
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await
    }
}

/// Starts the HTTP server and runs until the state's cancel token fires.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let (port, listener) = bind_listener(state.config.preferred_port).await?;
    log::info!("Server listening on http://0.0.0.0:{}", port);

    let shutdown = state.cancel_token.clone();
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("Server stopped");
    Ok(())
}
