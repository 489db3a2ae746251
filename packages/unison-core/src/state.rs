//! Core configuration and persisted session state.
//!
//! This module provides [`Config`], the tunable settings shared by every
//! service, and [`QueueSnapshot`], the optional on-disk queue that seeds the
//! session at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::track::TrackRef;

/// One linked catalog account.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogAccount {
    /// Human-readable label (used for ordering and logging).
    pub label: String,
    /// OAuth token for the catalog API.
    pub token: String,
}

impl std::fmt::Debug for CatalogAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogAccount")
            .field("label", &self.label)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Configuration for the Unison session server.
///
/// All fields have sensible defaults except `accounts`, which must list at
/// least one catalog credential before the server can start.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = scan the default range).
    pub preferred_port: u16,

    // Media
    /// Directory holding one audio file per resolved track.
    pub media_dir: PathBuf,

    /// Upper bound for one track resolution across all sources (seconds).
    pub resolve_timeout_secs: u64,

    /// Delete every media file on shutdown.
    pub purge_media_on_shutdown: bool,

    // Snapshot
    /// Queue snapshot read at startup, if present.
    pub snapshot_path: Option<PathBuf>,

    /// Write the queue back to `snapshot_path` on shutdown.
    pub save_snapshot_on_shutdown: bool,

    // Catalog
    /// Base URL of the catalog REST API.
    pub catalog_base_url: String,

    /// Per-request timeout for catalog calls (seconds).
    pub catalog_request_timeout_secs: u64,

    /// Linked accounts in priority order.
    pub accounts: Vec<CatalogAccount>,

    // WebSocket
    /// WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Mirror every session event into the debug log.
    pub log_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            media_dir: PathBuf::from("wwwroot/music"),
            resolve_timeout_secs: 120,
            purge_media_on_shutdown: false,
            snapshot_path: None,
            save_snapshot_on_shutdown: false,
            catalog_base_url: "https://api.music.yandex.net".to_string(),
            catalog_request_timeout_secs: 30,
            accounts: Vec::new(),
            ws_heartbeat_timeout_secs: 60,
            ws_heartbeat_check_interval_secs: 5,
            event_channel_capacity: 256,
            log_events: false,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.accounts.is_empty() {
            return Err("at least one catalog account is required".to_string());
        }
        if let Some(account) = self
            .accounts
            .iter()
            .find(|a| a.label.trim().is_empty() || a.token.trim().is_empty())
        {
            return Err(format!(
                "catalog account {:?} needs both a label and a token",
                account.label
            ));
        }
        if self.catalog_base_url.trim().is_empty() {
            return Err("catalog_base_url must not be empty".to_string());
        }
        if self.resolve_timeout_secs == 0 {
            return Err("resolve_timeout_secs must be >= 1".to_string());
        }
        if self.catalog_request_timeout_secs == 0 {
            return Err("catalog_request_timeout_secs must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.ws_heartbeat_check_interval_secs == 0 {
            return Err("ws_heartbeat_check_interval_secs must be >= 1".to_string());
        }
        if self.ws_heartbeat_timeout_secs < self.ws_heartbeat_check_interval_secs {
            return Err(
                "ws_heartbeat_timeout_secs must be >= ws_heartbeat_check_interval_secs".to_string(),
            );
        }
        if self.save_snapshot_on_shutdown && self.snapshot_path.is_none() {
            return Err("save_snapshot_on_shutdown requires snapshot_path".to_string());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue Snapshot (persisted)
// ─────────────────────────────────────────────────────────────────────────────

/// Queue contents persisted as a JSON array of track references.
///
/// Read once at startup. Written back only on shutdown and only when
/// configured to; queue mutations never touch the file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct QueueSnapshot {
    pub tracks: Vec<TrackRef>,
}

impl QueueSnapshot {
    /// Loads a snapshot.
    ///
    /// Returns an empty snapshot if the file doesn't exist or is invalid.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[Snapshot] No snapshot at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("[Snapshot] Cannot read {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&contents) {
            Ok(snapshot) => {
                log::info!(
                    "[Snapshot] Loaded {} track(s) from {}",
                    snapshot.tracks.len(),
                    path.display()
                );
                snapshot
            }
            Err(e) => {
                log::warn!("[Snapshot] Ignoring invalid {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Saves the snapshot.
    ///
    /// Uses atomic write (temp file + rename) to prevent corruption on crash.
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);
        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::track;

    fn valid_config() -> Config {
        Config {
            accounts: vec![CatalogAccount {
                label: "main".into(),
                token: "secret".into(),
            }],
            ..Config::default()
        }
    }

    #[test]
    fn config_default_is_sensible() {
        let config = Config::default();
        assert_eq!(config.preferred_port, 0);
        assert_eq!(config.media_dir, PathBuf::from("wwwroot/music"));
        assert_eq!(config.resolve_timeout_secs, 120);
        assert!(!config.save_snapshot_on_shutdown);
        assert!(!config.purge_media_on_shutdown);
    }

    #[test]
    fn config_requires_an_account() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn config_rejects_zero_values() {
        let mut config = valid_config();
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.resolve_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.ws_heartbeat_check_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_blank_token() {
        let mut config = valid_config();
        config.accounts.push(CatalogAccount {
            label: "second".into(),
            token: " ".into(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.contains("second"));
    }

    #[test]
    fn snapshot_save_needs_a_path() {
        let mut config = valid_config();
        config.save_snapshot_on_shutdown = true;
        assert!(config.validate().is_err());
        config.snapshot_path = Some(PathBuf::from("queue.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn account_debug_hides_token() {
        let rendered = format!("{:?}", valid_config().accounts[0]);
        assert!(rendered.contains("main"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(QueueSnapshot::load(&dir.path().join("none.json")).tracks.is_empty());
    }

    #[test]
    fn invalid_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(QueueSnapshot::load(&path).tracks.is_empty());
    }

    #[test]
    fn snapshot_reads_track_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            r#"[{"id":"1","title":"One","author":"A"},{"id":"2","title":"Two"}]"#,
        )
        .unwrap();

        let snapshot = QueueSnapshot::load(&path);
        assert_eq!(snapshot.tracks.len(), 2);
        assert_eq!(snapshot.tracks[0].file_name, "One_artist_A.mp3");
        assert_eq!(snapshot.tracks[1].file_name, "Two_artist_Unknown.mp3");
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("queue.json");
        let snapshot = QueueSnapshot {
            tracks: vec![track("1", "One", "A"), track("2", "Two", "B")],
        };

        snapshot.save(&path).unwrap();
        let loaded = QueueSnapshot::load(&path);
        assert_eq!(loaded, snapshot);
        assert!(!dir.path().join("state").join("queue.json.tmp").exists());
    }
}
