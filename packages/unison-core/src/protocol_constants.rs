//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of the wire contract with listener pages and the
//! on-disk media layout. Tunable values live in [`crate::state::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// Media Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Artist name used when the catalog reports no artist for a track.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Cover image shown for tracks without catalog artwork.
pub const DEFAULT_COVER_URI: &str = "/img/default-cover.png";

/// Extension of every locally stored audio file.
pub const MEDIA_FILE_EXTENSION: &str = "mp3";

/// Suffix for in-progress downloads. Never matches [`MEDIA_FILE_EXTENSION`].
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";

/// URL prefix under which the media directory is served.
pub const MEDIA_URL_PREFIX: &str = "/music";

// ─────────────────────────────────────────────────────────────────────────────
// Catalog HTTP API
// ─────────────────────────────────────────────────────────────────────────────

/// Authorization scheme expected by the catalog API.
pub const CATALOG_AUTH_SCHEME: &str = "OAuth";

/// Token verification endpoint (relative to the catalog base URL).
pub const CATALOG_ACCOUNT_STATUS_PATH: &str = "/account/status";

/// Liked-tracks endpoint for the authorized account.
pub const CATALOG_LIKED_TRACKS_PATH: &str = "/users/me/likes/tracks";

/// Retry delays for transient catalog errors (exponential backoff).
pub const CATALOG_RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Application name reported by the health endpoint.
pub const APP_NAME: &str = "Unison";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "unison-server";

/// First port tried when no preferred port is configured.
pub const PORT_RANGE_START: u16 = 48600;

/// Last port tried when no preferred port is configured.
pub const PORT_RANGE_END: u16 = 48610;

/// Prefix of generated listener connection ids.
pub const CONNECTION_ID_PREFIX: &str = "listener";

/// Parallel downloads when resolving an account's whole library.
pub const LIBRARY_DOWNLOAD_CONCURRENCY: usize = 4;
