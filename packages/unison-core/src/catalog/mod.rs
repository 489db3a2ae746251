//! Catalog collaborator: looks up tracks and retrieves their audio.
//!
//! The session never talks to a concrete catalog. It sees an ordered list of
//! capability-equivalent [`CatalogSource`]s (one per linked account) wrapped
//! in a [`CatalogChain`] that tries them in priority order.
//!
//! # Module Structure
//!
//! - `http` - `HttpCatalogSource`, the REST-backed implementation
//! - `chain` - priority-ordered fan-out with try-next-on-error
//! - `retry` - backoff for transient catalog errors

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::TrackMeta;

mod chain;
pub mod http;
pub(crate) mod retry;

pub(crate) use chain::describe_failures;
pub use chain::{CatalogChain, SourceFailure};
pub use http::HttpCatalogSource;

/// Errors reported by a catalog source.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request to the catalog failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Catalog returned a non-success status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// The account credential was rejected.
    #[error("Credential rejected for account '{0}'")]
    Unauthorized(String),

    /// The catalog has no track with this id.
    #[error("Track not found: {0}")]
    NotFound(String),

    /// The id is not a well-formed catalog identifier.
    #[error("Malformed track id: {0:?}")]
    InvalidId(String),

    /// Writing the fetched audio to disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    /// Returns true if the request may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Http(e) => e.is_timeout() || e.is_connect(),
            CatalogError::HttpStatus(status, _) => *status >= 500,
            _ => false,
        }
    }
}

/// Returns true if `id` is a well-formed catalog track id.
///
/// Ids are embedded in request paths, so only alphanumerics and `:`, `_`, `-`
/// are accepted.
#[must_use]
pub fn is_valid_track_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
}

/// One authorized catalog account.
///
/// Authorization happens when the source is constructed; every method here
/// runs against an already-authorized session.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable account label (used for ordering and logging).
    fn label(&self) -> &str;

    /// Returns every track the account has liked, in catalog order.
    async fn liked_tracks(&self) -> CatalogResult<Vec<TrackMeta>>;

    /// Looks up a single track's metadata.
    async fn track_by_id(&self, id: &str) -> CatalogResult<TrackMeta>;

    /// Streams the track's audio into `dest`, creating or truncating it.
    async fn fetch_audio(&self, track: &TrackMeta, dest: &Path) -> CatalogResult<()>;
}
