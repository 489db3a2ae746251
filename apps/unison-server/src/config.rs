//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use unison_core::CatalogAccount;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = scan the default range).
    /// Override: `UNISON_BIND_PORT`
    pub bind_port: u16,

    /// Directory for downloaded audio, served under `/music`.
    /// Override: `UNISON_MEDIA_DIR`
    pub media_dir: PathBuf,

    /// Queue snapshot loaded at startup.
    /// Override: `UNISON_SNAPSHOT`
    pub snapshot_path: Option<PathBuf>,

    /// Write the queue back to `snapshot_path` on shutdown.
    pub save_snapshot_on_shutdown: bool,

    /// Delete downloaded audio on shutdown.
    pub purge_media_on_shutdown: bool,

    /// Upper bound for resolving one track (seconds).
    pub resolve_timeout_secs: u64,

    /// Catalog REST API base URL.
    /// Override: `UNISON_CATALOG_URL`
    pub catalog_url: String,

    /// Per-request catalog timeout (seconds).
    pub catalog_request_timeout_secs: u64,

    /// Linked catalog accounts in priority order.
    /// Override: `UNISON_CATALOG_TOKENS` as `label=token,label=token`
    pub accounts: Vec<CatalogAccount>,

    /// Log every session event at debug level.
    pub log_events: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = unison_core::Config::default();
        Self {
            bind_port: 0,
            media_dir: core.media_dir,
            snapshot_path: None,
            save_snapshot_on_shutdown: false,
            purge_media_on_shutdown: false,
            resolve_timeout_secs: core.resolve_timeout_secs,
            catalog_url: core.catalog_base_url,
            catalog_request_timeout_secs: core.catalog_request_timeout_secs,
            accounts: Vec::new(),
            log_events: false,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides read through `lookup` (the process environment in
    /// production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("UNISON_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Some(val) = lookup("UNISON_MEDIA_DIR") {
            self.media_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("UNISON_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("UNISON_CATALOG_URL") {
            self.catalog_url = val;
        }

        // Replaces the file's account list entirely
        if let Some(val) = lookup("UNISON_CATALOG_TOKENS") {
            self.accounts =
                parse_accounts(&val).context("Invalid UNISON_CATALOG_TOKENS value")?;
        }

        Ok(())
    }

    /// Converts to unison-core's Config type.
    pub fn to_core_config(&self) -> unison_core::Config {
        unison_core::Config {
            preferred_port: self.bind_port,
            media_dir: self.media_dir.clone(),
            resolve_timeout_secs: self.resolve_timeout_secs,
            purge_media_on_shutdown: self.purge_media_on_shutdown,
            snapshot_path: self.snapshot_path.clone(),
            save_snapshot_on_shutdown: self.save_snapshot_on_shutdown,
            catalog_base_url: self.catalog_url.clone(),
            catalog_request_timeout_secs: self.catalog_request_timeout_secs,
            accounts: self.accounts.clone(),
            log_events: self.log_events,
            ..Default::default()
        }
    }
}

/// Parses `label=token` pairs separated by commas.
///
/// A bare token without `=` gets the label `account-N` (1-based).
fn parse_accounts(raw: &str) -> Result<Vec<CatalogAccount>> {
    let mut accounts = Vec::new();
    for (i, part) in raw.split(',').map(str::trim).enumerate() {
        if part.is_empty() {
            continue;
        }
        let (label, token) = match part.split_once('=') {
            Some((label, token)) => (label.trim().to_string(), token.trim().to_string()),
            None => (format!("account-{}", i + 1), part.to_string()),
        };
        if label.is_empty() || token.is_empty() {
            bail!("empty label or token in '{}'", part);
        }
        accounts.push(CatalogAccount { label, token });
    }
    Ok(accounts)
}
