//! Listener socket registry.
//!
//! Every WebSocket gets a `listener-N` id from [`WsConnectionManager`] and
//! holds a [`ConnectionGuard`] for as long as the socket lives. The id is the
//! listener's identity everywhere else (presence, event audiences).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::CONNECTION_ID_PREFIX;

/// Bookkeeping for one open socket.
struct Connection {
    opened: Instant,
    commands: AtomicU64,
}

/// Registry of open listener sockets.
pub struct WsConnectionManager {
    open: DashMap<String, Connection>,
    sequence: AtomicU64,
    /// Parent of every socket's token; swapped out by [`close_all`](Self::close_all).
    root: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            open: DashMap::new(),
            sequence: AtomicU64::new(0),
            root: RwLock::new(CancellationToken::new()),
        }
    }

    /// Assigns the next listener id and tracks the socket until the guard drops.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("{}-{}", CONNECTION_ID_PREFIX, n);
        let cancel = self.root.read().child_token();

        self.open.insert(
            id.clone(),
            Connection {
                opened: Instant::now(),
                commands: AtomicU64::new(0),
            },
        );
        log::info!("[WS] {} connected ({} open)", id, self.open.len());

        ConnectionGuard {
            id,
            cancel,
            manager: Arc::clone(self),
        }
    }

    fn release(&self, id: &str) {
        if let Some((_, conn)) = self.open.remove(id) {
            log::info!(
                "[WS] {} disconnected after {:.1}s, {} command(s) ({} open)",
                id,
                conn.opened.elapsed().as_secs_f64(),
                conn.commands.load(Ordering::Relaxed),
                self.open.len()
            );
        }
    }

    /// Counts a command received from `id`.
    pub fn record_command(&self, id: &str) {
        if let Some(conn) = self.open.get(id) {
            conn.commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.open.len()
    }

    /// Force-closes every open socket and returns how many were signalled.
    ///
    /// Sockets registered afterwards get a fresh parent token and stay open.
    pub fn close_all(&self) -> usize {
        let count = self.open.len();
        let mut root = self.root.write();
        root.cancel();
        *root = CancellationToken::new();
        if count > 0 {
            log::info!("[WS] Force-closed {} connection(s)", count);
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a socket registered; dropping it releases the id.
pub struct ConnectionGuard {
    id: String,
    cancel: CancellationToken,
    manager: Arc<WsConnectionManager>,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fires when the socket is force-closed.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.release(&self.id);
    }
}
