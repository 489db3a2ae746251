//! REST-backed catalog source.
//!
//! Talks to the catalog's JSON API with a per-account OAuth token. One
//! `HttpCatalogSource` exists per linked account; all of them share the
//! pooled `reqwest::Client` created at bootstrap.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use super::retry::with_retry;
use super::{is_valid_track_id, CatalogError, CatalogResult, CatalogSource};
use crate::protocol_constants::{
    CATALOG_ACCOUNT_STATUS_PATH, CATALOG_AUTH_SCHEME, CATALOG_LIKED_TRACKS_PATH,
};
use crate::track::TrackMeta;

/// Catalog source for one authorized account.
pub struct HttpCatalogSource {
    client: Client,
    base_url: String,
    label: String,
    token: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for HttpCatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalogSource")
            .field("base_url", &self.base_url)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl HttpCatalogSource {
    /// Authorizes `token` against the catalog and returns a ready source.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unauthorized`] if the catalog rejects the
    /// credential, or a transport error if the catalog is unreachable.
    pub async fn authorize(
        client: Client,
        base_url: &str,
        label: &str,
        token: &str,
        request_timeout: Duration,
    ) -> CatalogResult<Self> {
        let source = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            label: label.to_string(),
            token: token.to_string(),
            request_timeout,
        };

        let url = source.url(CATALOG_ACCOUNT_STATUS_PATH);
        with_retry("authorize", || source.send(source.client.get(&url))).await?;

        log::info!("[Catalog] Authorized account '{}'", source.label);
        Ok(source)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends an authorized request and maps error statuses.
    async fn send(&self, request: RequestBuilder) -> CatalogResult<Response> {
        let response = request
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", CATALOG_AUTH_SCHEME, self.token),
            )
            .timeout(self.request_timeout)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(CatalogError::Unauthorized(self.label.clone()))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(CatalogError::HttpStatus(s.as_u16(), body))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> CatalogResult<T> {
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json::<T>().await?)
    }

    /// Streams a response body into `dest` chunk by chunk.
    async fn download_to(&self, url: &str, dest: &Path) -> CatalogResult<u64> {
        let response = self.send(self.client.get(url)).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn liked_tracks(&self) -> CatalogResult<Vec<TrackMeta>> {
        let url = self.url(CATALOG_LIKED_TRACKS_PATH);
        let tracks: Vec<TrackMeta> = with_retry("liked_tracks", || self.get_json(&url)).await?;
        log::debug!(
            "[Catalog] '{}' reports {} liked track(s)",
            self.label,
            tracks.len()
        );
        Ok(tracks)
    }

    async fn track_by_id(&self, id: &str) -> CatalogResult<TrackMeta> {
        if !is_valid_track_id(id) {
            return Err(CatalogError::InvalidId(id.to_string()));
        }
        let url = self.url(&format!("/tracks/{}", id));
        with_retry("track_by_id", || self.get_json(&url))
            .await
            .map_err(|e| match e {
                CatalogError::HttpStatus(404, _) => CatalogError::NotFound(id.to_string()),
                other => other,
            })
    }

    async fn fetch_audio(&self, track: &TrackMeta, dest: &Path) -> CatalogResult<()> {
        if !is_valid_track_id(&track.id) {
            return Err(CatalogError::InvalidId(track.id.clone()));
        }
        let url = self.url(&format!("/tracks/{}/download", track.id));
        let bytes = with_retry("fetch_audio", || self.download_to(&url, dest)).await?;
        log::info!(
            "[Catalog] '{}' fetched {} ({} bytes) -> {}",
            self.label,
            track.id,
            bytes,
            dest.display()
        );
        Ok(())
    }
}
