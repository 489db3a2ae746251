//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::response::api_success;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ErrorCode, UnisonError, UnisonResult};
use crate::protocol_constants::{
    APP_NAME, LIBRARY_DOWNLOAD_CONCURRENCY, MEDIA_URL_PREFIX, SERVICE_ID,
};
use crate::services::MediaResolver;
use crate::track::{TrackMeta, TrackRef};

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// A liked track plus whether its audio is already cached.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LibraryTrack {
    #[serde(flatten)]
    track: TrackRef,
    local: bool,
}

/// One account's slice of the library.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LibraryAccount {
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracks: Option<Vec<LibraryTrack>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<LibraryError>,
}

#[derive(Serialize)]
struct LibraryError {
    code: &'static str,
    message: String,
}

/// Outcome of a bulk library download.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct DownloadSummary {
    label: String,
    total: usize,
    resolved: usize,
    failed: usize,
}

async fn library_tracks(resolver: &MediaResolver, tracks: &[TrackMeta]) -> Vec<LibraryTrack> {
    let checks = tracks.iter().map(|meta| async move {
        let track = TrackRef::from_meta(meta);
        LibraryTrack {
            local: resolver.is_local(&track).await,
            track,
        }
    });
    future::join_all(checks).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
///
/// The media directory is served under `/music` so listener pages can load
/// a track by its `fileName`.
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(state.session.resolver().media_dir());

    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_session_state))
        .route("/api/library", get(get_library))
        .route("/api/library/{label}/download", post(download_library))
        .route("/ws", get(ws_handler))
        .nest_service(MEDIA_URL_PREFIX, media)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness check: "Is the process running?"
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "app": APP_NAME,
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.ws_manager.connection_count(),
        "downloads": state.session.resolver().in_flight_count(),
        "accounts": state.session.catalog().labels(),
    }))
}

/// Returns the current track, cursor, queue and listeners.
async fn get_session_state(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.session.snapshot())
}

/// Lists every linked account's liked tracks.
///
/// A failing account is reported inline rather than failing the request.
async fn get_library(State(state): State<AppState>) -> impl IntoResponse {
    let resolver = state.session.resolver();
    let mut accounts = Vec::new();
    for (label, result) in state.session.catalog().liked_tracks_by_source().await {
        accounts.push(match result {
            Ok(tracks) => LibraryAccount {
                label,
                tracks: Some(library_tracks(resolver, &tracks).await),
                error: None,
            },
            Err(e) => LibraryAccount {
                label,
                tracks: None,
                error: Some(LibraryError {
                    code: e.code(),
                    message: e.to_string(),
                }),
            },
        });
    }

    api_success(json!({ "accounts": accounts }))
}

/// Resolves every liked track of one account into the media directory.
async fn download_library(
    Path(label): Path<String>,
    State(state): State<AppState>,
) -> UnisonResult<Response> {
    if label.trim().is_empty() {
        return Err(UnisonError::InvalidRequest(
            "account label must not be blank".to_string(),
        ));
    }
    let source = state
        .session
        .catalog()
        .get(&label)
        .ok_or_else(|| UnisonError::AccountNotFound(label.clone()))?;
    let tracks = source.liked_tracks().await?;
    let resolver = state.session.resolver();

    log::info!(
        "[API] Downloading {} liked track(s) for '{}'",
        tracks.len(),
        label
    );

    let outcomes: Vec<bool> = stream::iter(tracks.iter().map(TrackRef::from_meta))
        .map(|track| async move { resolver.ensure_local(&track).await.is_ok() })
        .buffer_unordered(LIBRARY_DOWNLOAD_CONCURRENCY)
        .collect()
        .await;

    let resolved = outcomes.iter().filter(|ok| **ok).count();
    let summary = DownloadSummary {
        label,
        total: outcomes.len(),
        resolved,
        failed: outcomes.len() - resolved,
    };
    log::info!("[API] Library download finished: {:?}", summary);

    Ok(api_success(summary).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::bootstrap::bootstrap_with_catalog;
    use crate::catalog::{CatalogChain, CatalogSource};
    use crate::state::Config;
    use crate::test_fixtures::{meta, FakeCatalog};

    fn app_state(dir: &std::path::Path, sources: Vec<FakeCatalog>) -> AppState {
        let config = Config {
            media_dir: dir.to_path_buf(),
            ..Config::default()
        };
        let chain = CatalogChain::new(
            sources
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn CatalogSource>)
                .collect(),
        );
        let services = bootstrap_with_catalog(&config, chain).unwrap();
        AppState::new(&services)
    }

    async fn json_body(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), vec![FakeCatalog::new("main")]);

        let (status, body) = json_body(health_check(State(state)).await.into_response()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["accounts"], serde_json::json!(["main"]));
        assert_eq!(body["downloads"], 0);
    }

    #[tokio::test]
    async fn library_lists_tracks_and_failures_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(
            dir.path(),
            vec![
                FakeCatalog::new("up").with_liked(meta("1", "One", "A")),
                FakeCatalog::new("down").failing(),
            ],
        );
        std::fs::write(dir.path().join("One_artist_A.mp3"), b"x").unwrap();

        let (_, body) = json_body(get_library(State(state)).await.into_response()).await;
        let accounts = body["accounts"].as_array().unwrap();
        assert_eq!(accounts[0]["label"], "up");
        assert_eq!(accounts[0]["tracks"][0]["fileName"], "One_artist_A.mp3");
        assert_eq!(accounts[0]["tracks"][0]["local"], true);
        assert_eq!(accounts[1]["error"]["code"], "catalog_error_status");
    }

    #[tokio::test]
    async fn download_resolves_every_liked_track() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(
            dir.path(),
            vec![FakeCatalog::new("main")
                .with_liked(meta("1", "One", "A"))
                .with_liked(meta("2", "Two", "B"))],
        );

        let response = download_library(Path("main".into()), State(state))
            .await
            .unwrap();
        let (_, body) = json_body(response).await;
        assert_eq!(body["resolved"], 2);
        assert_eq!(body["failed"], 0);
        assert!(dir.path().join("Two_artist_B.mp3").is_file());
    }

    #[tokio::test]
    async fn download_for_blank_label_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), vec![FakeCatalog::new("main")]);

        let err = download_library(Path("  ".into()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn download_for_unknown_account_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), vec![FakeCatalog::new("main")]);

        let err = download_library(Path("ghost".into()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
