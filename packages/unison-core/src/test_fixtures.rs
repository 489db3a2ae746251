//! Shared fakes for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::catalog::{CatalogError, CatalogResult, CatalogSource};
use crate::events::{EventEmitter, Outbound, SessionEvent};
use crate::track::{ArtistMeta, TrackMeta, TrackRef};

/// Builds catalog metadata with a single artist.
pub fn meta(id: &str, title: &str, artist: &str) -> TrackMeta {
    TrackMeta {
        id: id.to_string(),
        title: title.to_string(),
        artists: vec![ArtistMeta {
            name: artist.to_string(),
        }],
        cover_uri: None,
    }
}

/// Builds a track reference with a single artist.
pub fn track(id: &str, title: &str, artist: &str) -> TrackRef {
    TrackRef::from_meta(&meta(id, title, artist))
}

/// In-memory catalog source with call counters.
#[derive(Default)]
pub struct FakeCatalog {
    label: String,
    tracks: Vec<TrackMeta>,
    liked: Vec<TrackMeta>,
    failing: bool,
    fetch_fails: bool,
    fetch_delay: Option<Duration>,
    lookups: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Every call fails with a 503.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Lookups succeed but audio fetches fail.
    pub fn fetch_fails(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    /// Delays every audio fetch.
    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Makes a track resolvable by id.
    pub fn with_track(mut self, track: TrackMeta) -> Self {
        self.tracks.push(track);
        self
    }

    /// Adds a liked track (also resolvable by id).
    pub fn with_liked(mut self, track: TrackMeta) -> Self {
        self.tracks.push(track.clone());
        self.liked.push(track);
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn unavailable() -> CatalogError {
        CatalogError::HttpStatus(503, "unavailable".to_string())
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    fn label(&self) -> &str {
        &self.label
    }

    async fn liked_tracks(&self) -> CatalogResult<Vec<TrackMeta>> {
        if self.failing {
            return Err(Self::unavailable());
        }
        Ok(self.liked.clone())
    }

    async fn track_by_id(&self, id: &str) -> CatalogResult<TrackMeta> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Self::unavailable());
        }
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn fetch_audio(&self, track: &TrackMeta, dest: &Path) -> CatalogResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing || self.fetch_fails {
            return Err(CatalogError::HttpStatus(502, "bad gateway".to_string()));
        }
        tokio::fs::write(dest, format!("audio:{}:{}", self.label, track.id)).await?;
        Ok(())
    }
}

/// Emitter that records every outbound event.
#[derive(Default)]
pub struct RecordingEmitter {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    /// Events a given connection would receive, in emission order.
    pub fn received_by(&self, connection_id: &str) -> Vec<SessionEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|o| o.audience.includes(connection_id))
            .map(|o| o.event.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, outbound: Outbound) {
        self.sent.lock().push(outbound);
    }
}
