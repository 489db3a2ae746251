//! Connected listeners and host election.
//!
//! At most one listener is host. When the host leaves, the earliest-joined
//! remaining listener takes over, so a non-empty session is never host-less.

use serde::Serialize;

/// One connected participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub connection_id: String,
    pub is_host: bool,
}

/// Listener set in join order.
#[derive(Debug, Default)]
pub struct Presence {
    listeners: Vec<Listener>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    ///
    /// Returns `true` if the listener was granted host because no host
    /// existed. Joining twice with the same id is a no-op.
    pub fn join(&mut self, connection_id: &str) -> bool {
        if self.contains(connection_id) {
            log::debug!("[Presence] {} already joined", connection_id);
            return false;
        }

        let is_host = self.host().is_none();
        self.listeners.push(Listener {
            connection_id: connection_id.to_string(),
            is_host,
        });
        log::info!(
            "[Presence] {} joined (host: {}, listeners: {})",
            connection_id,
            is_host,
            self.listeners.len()
        );
        is_host
    }

    /// Removes a listener.
    ///
    /// Returns the id of the newly elected host if the departing listener was
    /// host and anyone remains.
    pub fn leave(&mut self, connection_id: &str) -> Option<String> {
        let position = self
            .listeners
            .iter()
            .position(|l| l.connection_id == connection_id)?;
        let removed = self.listeners.remove(position);
        log::info!(
            "[Presence] {} left (listeners: {})",
            connection_id,
            self.listeners.len()
        );

        if !removed.is_host {
            return None;
        }

        let successor = self.listeners.first_mut()?;
        successor.is_host = true;
        log::info!("[Presence] Host moved to {}", successor.connection_id);
        Some(successor.connection_id.clone())
    }

    /// Id of the current host, if any.
    pub fn host(&self) -> Option<&str> {
        self.listeners
            .iter()
            .find(|l| l.is_host)
            .map(|l| l.connection_id.as_str())
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.listeners.iter().any(|l| l.connection_id == connection_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }
}
