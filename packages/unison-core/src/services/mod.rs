//! Application services layer.
//!
//! This module contains the session services that sit between the API layer
//! and infrastructure (catalog/, the media directory).
//!
//! - `queue_store` - ordered play queue with dense positions
//! - `presence` - connected listeners and host election
//! - `media_resolver` - fetch-and-cache of track audio with in-flight dedup
//! - `session_coordinator` - serialized command handling and event fan-out

pub mod media_resolver;
pub mod presence;
pub mod queue_store;
pub mod session_coordinator;

pub use media_resolver::{MediaResolver, ResolveError, ResolveResult};
pub use presence::{Listener, Presence};
pub use queue_store::QueueStore;
pub use session_coordinator::{SessionCoordinator, SessionSnapshot};
