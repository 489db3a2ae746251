//! Unison Core - shared playback session library.
//!
//! This crate provides the core functionality for Unison, a server that keeps
//! a group of web listeners on the same queue of tracks. Listeners connect
//! over WebSocket, any of them can change what plays, and the audio is
//! fetched once from a music catalog into a local directory served over HTTP.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`track`]: Track references and the local file naming scheme
//! - [`catalog`]: Catalog sources (one per linked account) and the fallback chain
//! - [`services`]: Queue, presence, media resolution and the session coordinator
//! - [`events`]: Session events and their delivery to listeners
//! - [`api`]: HTTP routes and the WebSocket endpoint
//! - [`state`]: Configuration and queue snapshots
//! - [`runtime`]: Task spawning abstraction
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`CatalogSource`](catalog::CatalogSource): One authorized catalog account
//! - [`EventEmitter`](events::EventEmitter): Delivering session events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod track;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types at the crate root
pub use catalog::{CatalogChain, CatalogError, CatalogSource, HttpCatalogSource};
pub use error::{ErrorCode, UnisonError, UnisonResult};
pub use events::{Audience, BroadcastEventBridge, EventEmitter, Outbound, SessionEvent};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{CatalogAccount, Config, QueueSnapshot};
pub use track::{QueueEntry, TrackMeta, TrackRef};

// Re-export service types
pub use services::{MediaResolver, ResolveError, SessionCoordinator, SessionSnapshot};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_with_catalog, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError, WsConnectionManager};
