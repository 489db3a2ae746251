//! Event system for real-time listener communication.
//!
//! This module provides:
//! - [`SessionEvent`], the outbound messages listeners receive
//! - [`Audience`], who a given event is addressed to
//! - [`EventEmitter`] trait for the session to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//!
//! Every event travels through a single ordered channel wrapped in an
//! [`Outbound`] envelope; each socket filters by its own connection id. One
//! channel keeps broadcasts and unicasts in commit order for every listener.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter};

use serde::Serialize;

use crate::track::QueueEntry;

/// Messages pushed to listeners.
///
/// Serialized as `{"type": "...", "payload": ...}`; variants without data
/// carry no `payload` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionEvent {
    /// Start playing this entry.
    ChangeSong(QueueEntry),

    /// An entry was appended to the queue.
    AddToQueue(QueueEntry),

    /// The queue was emptied.
    ClearQueue,

    /// The recipient is now the host.
    BecomeHost,

    /// Pause playback.
    PauseSong,

    /// Resume playback at an offset (seconds).
    PlaySong {
        #[serde(rename = "timeOffset")]
        time_offset: f64,
    },
}

impl SessionEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeSong(_) => "ChangeSong",
            Self::AddToQueue(_) => "AddToQueue",
            Self::ClearQueue => "ClearQueue",
            Self::BecomeHost => "BecomeHost",
            Self::PauseSong => "PauseSong",
            Self::PlaySong { .. } => "PlaySong",
        }
    }
}

/// Recipients of an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connected listener.
    All,
    /// Every listener except the sender.
    AllExcept(String),
    /// A single listener.
    Only(String),
}

impl Audience {
    /// Returns true if `connection_id` should receive the event.
    pub fn includes(&self, connection_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != connection_id,
            Self::Only(target) => target == connection_id,
        }
    }
}

/// An event paired with its audience.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub event: SessionEvent,
}
