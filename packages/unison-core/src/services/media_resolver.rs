//! Media Resolver: makes a track's audio available in the media directory.
//!
//! A track is local when `media_dir/<file_name>` exists. Otherwise the
//! resolver asks the catalog chain for it, streaming into a `.part` file that
//! is renamed into place only once complete, so a file that exists under its
//! final name is always whole.
//!
//! Concurrent requests for the same track share one download. The download
//! runs as its own task so cancelling a waiting caller never stalls it; only
//! the resolver's shutdown token stops it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::{describe_failures, CatalogChain};
use crate::protocol_constants::{MEDIA_FILE_EXTENSION, PARTIAL_DOWNLOAD_SUFFIX};
use crate::track::TrackRef;

/// Errors from making a track local.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Every catalog source failed to look up or fetch the track.
    #[error("No catalog source could provide track {track_id}: {reasons}")]
    AllSourcesFailed { track_id: String, reasons: String },

    /// Resolution did not finish within the configured bound.
    #[error("Resolving track {track_id} timed out after {secs}s")]
    Timeout { track_id: String, secs: u64 },

    /// The media directory could not be written.
    #[error("Media directory error: {0}")]
    Io(String),

    /// The server began shutting down before the download finished.
    #[error("Resolving track {track_id} cancelled by shutdown")]
    Cancelled { track_id: String },
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Convenient Result alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

type SharedDownload = Shared<BoxFuture<'static, ResolveResult<PathBuf>>>;

/// Ensures track audio exists locally before playback.
pub struct MediaResolver {
    media_dir: PathBuf,
    catalog: CatalogChain,
    timeout: Duration,
    in_flight: Arc<Mutex<HashMap<String, SharedDownload>>>,
    shutdown: CancellationToken,
}

impl MediaResolver {
    /// Creates a resolver rooted at `media_dir`.
    ///
    /// `timeout` bounds a single download across every catalog source.
    pub fn new(media_dir: impl Into<PathBuf>, catalog: CatalogChain, timeout: Duration) -> Self {
        Self {
            media_dir: media_dir.into(),
            catalog,
            timeout,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stops downloads (running and future) when `shutdown` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Where `track`'s audio lives once resolved.
    pub fn local_path(&self, track: &TrackRef) -> PathBuf {
        self.media_dir.join(&track.file_name)
    }

    /// Returns true if the track's audio is already in the media directory.
    pub async fn is_local(&self, track: &TrackRef) -> bool {
        tokio::fs::try_exists(self.local_path(track)).await.unwrap_or(false)
    }

    /// Number of downloads currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Makes `track` local, downloading it if needed.
    ///
    /// Returns immediately without network I/O when the file already exists.
    /// Concurrent calls for the same track await the same download.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::AllSourcesFailed`] if no catalog source could
    /// provide the audio, or [`ResolveError::Timeout`] if the download took
    /// longer than the configured bound.
    pub async fn ensure_local(&self, track: &TrackRef) -> ResolveResult<PathBuf> {
        let path = self.local_path(track);
        if self.is_local(track).await {
            log::debug!("[Resolver] {} already local", track.file_name);
            return Ok(path);
        }

        let download = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(&track.id) {
                log::debug!("[Resolver] Joining in-flight download of {}", track.id);
                existing.clone()
            } else if path.is_file() {
                // Finished between the first check and taking the lock.
                return Ok(path);
            } else {
                let download = self.start_download(track.clone(), path);
                in_flight.insert(track.id.clone(), download.clone());
                download
            }
        };

        download.await
    }

    fn start_download(&self, track: TrackRef, dest: PathBuf) -> SharedDownload {
        let catalog = self.catalog.clone();
        let media_dir = self.media_dir.clone();
        let timeout = self.timeout;
        let in_flight = Arc::clone(&self.in_flight);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            log::info!("[Resolver] Downloading {} -> {}", track.id, dest.display());
            let result = download(&catalog, &media_dir, &track, &dest, timeout, &shutdown).await;
            in_flight.lock().remove(&track.id);

            match &result {
                Ok(_) => log::info!("[Resolver] {} is now local", track.file_name),
                Err(e) => log::warn!("[Resolver] {}", e),
            }
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(ResolveError::Io(format!("download task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Waits until no download is running.
    ///
    /// Call after cancelling the shutdown token: every download then ends
    /// without renaming anything into the media directory, so nothing new
    /// appears there once this returns.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<SharedDownload> = self.in_flight.lock().values().cloned().collect();
            if pending.is_empty() {
                return;
            }
            log::info!("[Resolver] Waiting for {} download(s) to stop", pending.len());
            future::join_all(pending).await;
        }
    }

    /// Deletes every media file in the media directory.
    ///
    /// Leftover `.part` files are removed too. Returns how many files were
    /// deleted; a missing directory counts as empty.
    pub async fn purge(&self) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.media_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_media = path.extension().is_some_and(|ext| {
                ext == MEDIA_FILE_EXTENSION || ext == PARTIAL_DOWNLOAD_SUFFIX
            });
            if is_media && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        log::info!(
            "[Resolver] Purged {} file(s) from {}",
            removed,
            self.media_dir.display()
        );
        Ok(removed)
    }
}

/// Downloads into a unique partial file, then renames it into place.
async fn download(
    catalog: &CatalogChain,
    media_dir: &Path,
    track: &TrackRef,
    dest: &Path,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> ResolveResult<PathBuf> {
    tokio::fs::create_dir_all(media_dir).await?;
    let partial = partial_path(dest);

    // The rename stays outside the select so it is never interrupted.
    let fetched = tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(ResolveError::Cancelled {
            track_id: track.id.clone(),
        }),
        fetched = tokio::time::timeout(timeout, fetch_with_fallback(catalog, track, &partial)) => {
            fetched.unwrap_or_else(|_| {
                Err(ResolveError::Timeout {
                    track_id: track.id.clone(),
                    secs: timeout.as_secs(),
                })
            })
        }
    };
    let result = match fetched {
        Ok(()) => tokio::fs::rename(&partial, dest)
            .await
            .map(|_| dest.to_path_buf())
            .map_err(ResolveError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}

/// Looks the track up and fetches its audio, falling through sources in order.
async fn fetch_with_fallback(
    catalog: &CatalogChain,
    track: &TrackRef,
    partial: &Path,
) -> ResolveResult<()> {
    catalog
        .first_success("resolve", |source| async move {
            let meta = source.track_by_id(&track.id).await?;
            source.fetch_audio(&meta, partial).await
        })
        .await
        .map_err(|failures| ResolveError::AllSourcesFailed {
            track_id: track.id.clone(),
            reasons: describe_failures(&failures),
        })
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{}", uuid::Uuid::new_v4(), PARTIAL_DOWNLOAD_SUFFIX));
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSource;
    use crate::test_fixtures::{meta, track, FakeCatalog};

    fn resolver(dir: &Path, sources: Vec<Arc<FakeCatalog>>, timeout: Duration) -> MediaResolver {
        let chain = CatalogChain::new(
            sources
                .into_iter()
                .map(|s| s as Arc<dyn CatalogSource>)
                .collect(),
        );
        MediaResolver::new(dir, chain, timeout)
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn existing_file_skips_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let t = track("1", "Song", "Band");
        std::fs::write(dir.path().join(&t.file_name), b"cached").unwrap();

        let source = Arc::new(FakeCatalog::new("a").failing());
        let resolver = resolver(dir.path(), vec![source.clone()], Duration::from_secs(5));

        let path = resolver.ensure_local(&t).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"cached");
        assert_eq!(source.lookup_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn downloads_missing_track_under_derived_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeCatalog::new("a").with_track(meta("1", "Song", "Band")));
        let resolver = resolver(dir.path(), vec![source.clone()], Duration::from_secs(5));

        let path = resolver.ensure_local(&track("1", "Song", "Band")).await.unwrap();
        assert_eq!(path, dir.path().join("Song_artist_Band.mp3"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "audio:a:1");
        assert_eq!(files_in(dir.path()), vec!["Song_artist_Band.mp3"]);
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn creates_missing_media_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("wwwroot").join("music");
        let source = Arc::new(FakeCatalog::new("a").with_track(meta("1", "Song", "Band")));
        let resolver = resolver(&nested, vec![source], Duration::from_secs(5));

        resolver.ensure_local(&track("1", "Song", "Band")).await.unwrap();
        assert!(nested.join("Song_artist_Band.mp3").is_file());
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_download() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(
            FakeCatalog::new("a")
                .with_track(meta("1", "Song", "Band"))
                .fetch_delay(Duration::from_millis(50)),
        );
        let resolver = resolver(dir.path(), vec![source.clone()], Duration::from_secs(5));
        let t = track("1", "Song", "Band");

        let (a, b, c) = tokio::join!(
            resolver.ensure_local(&t),
            resolver.ensure_local(&t),
            resolver.ensure_local(&t)
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_next_source() {
        let dir = tempfile::tempdir().unwrap();
        let broken = Arc::new(
            FakeCatalog::new("first")
                .with_track(meta("1", "Song", "Band"))
                .fetch_fails(),
        );
        let healthy = Arc::new(FakeCatalog::new("second").with_track(meta("1", "Song", "Band")));
        let resolver = resolver(
            dir.path(),
            vec![broken.clone(), healthy.clone()],
            Duration::from_secs(5),
        );

        let path = resolver.ensure_local(&track("1", "Song", "Band")).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "audio:second:1");
        assert_eq!(broken.fetch_count(), 1);
        assert_eq!(healthy.fetch_count(), 1);
        assert_eq!(files_in(dir.path()), vec!["Song_artist_Band.mp3"]);
    }

    #[tokio::test]
    async fn all_sources_failing_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(
            dir.path(),
            vec![
                Arc::new(FakeCatalog::new("a").failing()),
                Arc::new(FakeCatalog::new("b")),
            ],
            Duration::from_secs(5),
        );

        let err = resolver
            .ensure_local(&track("404", "Gone", "Nobody"))
            .await
            .unwrap_err();

        match err {
            ResolveError::AllSourcesFailed { track_id, reasons } => {
                assert_eq!(track_id, "404");
                assert!(reasons.contains("a:"));
                assert!(reasons.contains("b:"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn slow_download_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(
            FakeCatalog::new("slow")
                .with_track(meta("1", "Song", "Band"))
                .fetch_delay(Duration::from_secs(60)),
        );
        let resolver = resolver(dir.path(), vec![source], Duration::from_millis(50));

        let err = resolver
            .ensure_local(&track("1", "Song", "Band"))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Timeout { ref track_id, .. } if track_id == "1"));
        assert!(files_in(dir.path()).is_empty());
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failed_download_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(
            dir.path(),
            vec![Arc::new(FakeCatalog::new("a"))],
            Duration::from_secs(5),
        );
        let t = track("1", "Song", "Band");

        assert!(resolver.ensure_local(&t).await.is_err());
        std::fs::write(dir.path().join(&t.file_name), b"added later").unwrap();
        assert!(resolver.ensure_local(&t).await.is_ok());
    }

    #[tokio::test]
    async fn purge_removes_media_and_partials_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_artist_b.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("c_artist_d.mp3.1234.part"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        let resolver = resolver(dir.path(), vec![], Duration::from_secs(5));

        assert_eq!(resolver.purge().await.unwrap(), 2);
        assert_eq!(files_in(dir.path()), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn purge_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(&dir.path().join("absent"), vec![], Duration::from_secs(5));
        assert_eq!(resolver.purge().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_downloads_without_leaving_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(
            FakeCatalog::new("slow")
                .with_track(meta("1", "Song", "Band"))
                .fetch_delay(Duration::from_secs(30)),
        );
        let shutdown = CancellationToken::new();
        let resolver = Arc::new(
            resolver(dir.path(), vec![source.clone()], Duration::from_secs(60))
                .with_shutdown(shutdown.clone()),
        );

        let waiting = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.ensure_local(&track("1", "Song", "Band")).await })
        };
        while source.fetch_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        shutdown.cancel();
        resolver.wait_idle().await;

        assert_eq!(resolver.in_flight_count(), 0);
        assert!(matches!(waiting.await.unwrap(), Err(ResolveError::Cancelled { .. })));
        assert!(files_in(dir.path()).is_empty());

        // Nothing new starts once shut down.
        let late = resolver.ensure_local(&track("1", "Song", "Band")).await;
        assert!(matches!(late, Err(ResolveError::Cancelled { .. })));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn is_local_reflects_media_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path(), vec![], Duration::from_secs(5));
        let t = track("1", "Song", "Band");

        assert!(!resolver.is_local(&t).await);
        std::fs::write(resolver.local_path(&t), b"x").unwrap();
        assert!(resolver.is_local(&t).await);
    }
}
