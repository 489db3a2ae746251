//! WebSocket handler for real-time listener communication.
//!
//! A socket's view of the session is written to it directly, never through
//! the bounded event channel: on `Join`, and again whenever its receiver lags.
//! The receiver is re-subscribed under the session lock at the same moment,
//! so the events that follow continue exactly where the replay ends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::api::AppState;
use crate::events::{Outbound, SessionEvent};
use crate::runtime::TaskSpawner;
use crate::track::TrackRef;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope: `{"type": ..., "payload": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
enum WsIncoming {
    Join,
    ChangeSong(TrackRef),
    ChangeSongByIndex(IndexPayload),
    Next,
    Previous,
    AddToQueue(TrackRef),
    ClearQueue,
    ShuffleAll,
    Pause,
    PlayAt(PlayAtPayload),
    Heartbeat,
}

/// A queue position as sent by listener pages.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexValue {
    Number(i64),
    Text(String),
}

/// `ChangeSongByIndex` accepts a bare value or `{"index": value}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexPayload {
    Bare(IndexValue),
    Wrapped { index: IndexValue },
}

impl IndexPayload {
    /// The requested index, or `None` if the text is not an integer.
    fn index(&self) -> Option<i64> {
        let value = match self {
            Self::Bare(value) | Self::Wrapped { index: value } => value,
        };
        match value {
            IndexValue::Number(n) => Some(*n),
            IndexValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayAtPayload {
    time_offset: f64,
}

/// Transport-level replies that are not session events.
#[derive(Serialize)]
#[serde(tag = "type")]
enum WsOutgoing {
    HeartbeatAck,
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

fn event_message(event: &SessionEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            log::warn!("[WS] Failed to serialize {}: {}", event.name(), e);
            None
        }
    }
}

/// Serializes an outbound event if `conn_id` is among its recipients.
fn outbound_message(outbound: &Outbound, conn_id: &str) -> Option<Message> {
    if !outbound.audience.includes(conn_id) {
        return None;
    }
    event_message(&outbound.event)
}

/// Writes a replay straight to the socket, in order.
async fn send_replay(
    sender: &mut SplitSink<WebSocket, Message>,
    events: &[SessionEvent],
) -> Result<(), axum::Error> {
    for event in events {
        if let Some(msg) = event_message(event) {
            sender.send(msg).await?;
        }
    }
    Ok(())
}

/// Joins the session, returning the replay and a receiver that starts right after it.
fn join_session(
    state: &AppState,
    conn_id: &str,
) -> (Vec<SessionEvent>, broadcast::Receiver<Outbound>) {
    state.session.join_with(conn_id, || state.event_bridge.subscribe())
}

/// Rebuilds a lagged listener's view with a fresh receiver.
fn resync_session(state: &AppState) -> (Vec<SessionEvent>, broadcast::Receiver<Outbound>) {
    state.session.resync_with(|| state.event_bridge.subscribe())
}

// ─────────────────────────────────────────────────────────────────────────────
// Command Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Hands a parsed command to the session.
///
/// Commands that may wait on a download run as background tasks; the rest
/// apply inline in arrival order. `Join` and `Heartbeat` write to the socket
/// and are handled by the connection loop.
fn dispatch(state: &AppState, conn_id: &str, command: WsIncoming) {
    let session = Arc::clone(&state.session);
    match command {
        WsIncoming::Join | WsIncoming::Heartbeat => {}
        WsIncoming::ClearQueue => session.clear_queue(),
        WsIncoming::Pause => session.pause(conn_id),
        WsIncoming::PlayAt(payload) => session.play_at(conn_id, payload.time_offset),
        WsIncoming::ChangeSong(track) => state.spawner.spawn(async move {
            session.change_song(track).await;
        }),
        WsIncoming::ChangeSongByIndex(payload) => match payload.index() {
            Some(index) => state.spawner.spawn(async move {
                session.change_song_by_index(index).await;
            }),
            None => log::debug!("[WS] {} sent malformed index {:?}", conn_id, payload),
        },
        WsIncoming::Next => state.spawner.spawn(async move {
            session.next().await;
        }),
        WsIncoming::Previous => state.spawner.spawn(async move {
            session.previous().await;
        }),
        WsIncoming::AddToQueue(track) => state.spawner.spawn(async move {
            session.add_to_queue(track).await;
        }),
        WsIncoming::ShuffleAll => state.spawner.spawn(async move {
            session.shuffle_all().await;
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();

    // Register connection for tracking and force-close capability
    let conn_guard = state.ws_manager.register();
    let conn_id = conn_guard.id().to_string();
    let cancel_token = conn_guard.cancel_token().clone();

    let heartbeat_timeout = Duration::from_secs(state.config.ws_heartbeat_timeout_secs);
    let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(
        state.config.ws_heartbeat_check_interval_secs,
    ));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Handle force-close request
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_id);
                break;
            }
            // Handle incoming messages from the listener
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::Heartbeat) => {
                                if let Some(msg) = WsOutgoing::HeartbeatAck.to_message() {
                                    if sender.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Ok(WsIncoming::Join) => {
                                state.ws_manager.record_command(&conn_id);
                                let (replay, rx) = join_session(&state, &conn_id);
                                broadcast_rx = rx;
                                if send_replay(&mut sender, &replay).await.is_err() {
                                    break;
                                }
                            }
                            Ok(command) => {
                                log::debug!("[WS] {} -> {:?}", conn_id, command);
                                state.ws_manager.record_command(&conn_id);
                                dispatch(&state, &conn_id, command);
                            }
                            Err(e) => {
                                log::debug!("[WS] Ignoring message from {}: {}", conn_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Deliver session events addressed to this listener
            recv = broadcast_rx.recv() => {
                match recv {
                    Ok(outbound) => {
                        if let Some(msg) = outbound_message(&outbound, &conn_id) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "[WS] {} lagged, skipped {} event(s); resyncing",
                            conn_id,
                            skipped
                        );
                        let (replay, rx) = resync_session(&state);
                        broadcast_rx = rx;
                        if send_replay(&mut sender, &replay).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Heartbeat timeout check
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_id);
                    break;
                }
            }
        }
    }

    // Every way out of the loop is a disconnect.
    state.session.leave(&conn_id);
    // ConnectionGuard Drop unregisters the socket
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::bootstrap::bootstrap_with_catalog;
    use crate::catalog::{CatalogChain, CatalogSource};
    use crate::events::Audience;
    use crate::state::Config;
    use crate::test_fixtures::{meta, track, FakeCatalog};

    /// State with a tiny event channel and a queue longer than it.
    async fn crowded_state(dir: &std::path::Path) -> AppState {
        let mut catalog = FakeCatalog::new("main");
        for i in 0..6 {
            catalog = catalog.with_track(meta(&i.to_string(), &format!("Song {i}"), "Band"));
        }
        let config = Config {
            media_dir: dir.to_path_buf(),
            event_channel_capacity: 2,
            ..Config::default()
        };
        let chain = CatalogChain::new(vec![Arc::new(catalog) as Arc<dyn CatalogSource>]);
        let services = bootstrap_with_catalog(&config, chain).unwrap();
        for i in 0..6 {
            let t = track(&i.to_string(), &format!("Song {i}"), "Band");
            services.session.add_to_queue(t).await;
        }
        AppState::new(&services)
    }

    fn parse(json: &str) -> Option<WsIncoming> {
        serde_json::from_str(json).ok()
    }

    #[test]
    fn parses_unit_commands() {
        assert!(matches!(parse(r#"{"type":"Join"}"#), Some(WsIncoming::Join)));
        assert!(matches!(parse(r#"{"type":"Next"}"#), Some(WsIncoming::Next)));
        assert!(matches!(
            parse(r#"{"type":"ShuffleAll","payload":null}"#),
            Some(WsIncoming::ShuffleAll)
        ));
        assert!(matches!(parse(r#"{"type":"Heartbeat"}"#), Some(WsIncoming::Heartbeat)));
    }

    #[test]
    fn parses_track_payload() {
        let cmd = parse(
            r#"{"type":"AddToQueue","payload":{"id":"9","title":"Song","author":"Band"}}"#,
        );
        match cmd {
            Some(WsIncoming::AddToQueue(track)) => {
                assert_eq!(track.id, "9");
                assert_eq!(track.file_name, "Song_artist_Band.mp3");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn index_accepts_number_and_numeric_text() {
        let index_of = |json: &str| match parse(json) {
            Some(WsIncoming::ChangeSongByIndex(p)) => p.index(),
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(index_of(r#"{"type":"ChangeSongByIndex","payload":2}"#), Some(2));
        assert_eq!(index_of(r#"{"type":"ChangeSongByIndex","payload":"3"}"#), Some(3));
        assert_eq!(
            index_of(r#"{"type":"ChangeSongByIndex","payload":{"index":" 4 "}}"#),
            Some(4)
        );
        assert_eq!(index_of(r#"{"type":"ChangeSongByIndex","payload":"abc"}"#), None);
        assert_eq!(index_of(r#"{"type":"ChangeSongByIndex","payload":-1}"#), Some(-1));
    }

    #[test]
    fn play_at_reads_time_offset() {
        match parse(r#"{"type":"PlayAt","payload":{"timeOffset":12.25}}"#) {
            Some(WsIncoming::PlayAt(p)) => assert_eq!(p.time_offset, 12.25),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_or_malformed_messages_are_rejected() {
        assert!(parse(r#"{"type":"Explode"}"#).is_none());
        assert!(parse(r#"{"type":"ChangeSong","payload":{"title":"no id"}}"#).is_none());
        assert!(parse("not json").is_none());
    }

    #[test]
    fn heartbeat_ack_shape() {
        let json = serde_json::to_string(&WsOutgoing::HeartbeatAck).unwrap();
        assert_eq!(json, r#"{"type":"HeartbeatAck"}"#);
    }

    #[test]
    fn outbound_is_filtered_by_audience() {
        let outbound = Outbound {
            audience: Audience::AllExcept("listener-1".into()),
            event: SessionEvent::PauseSong,
        };
        assert!(outbound_message(&outbound, "listener-1").is_none());
        assert!(outbound_message(&outbound, "listener-2").is_some());
    }

    #[tokio::test]
    async fn join_replays_full_queue_beyond_channel_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let state = crowded_state(dir.path()).await;

        let (replay, mut rx) = join_session(&state, "listener-1");

        assert_eq!(replay.len(), 8);
        assert!(matches!(&replay[0], SessionEvent::ChangeSong(e) if e.queue_index == 0));
        for (pos, event) in replay[1..7].iter().enumerate() {
            assert!(matches!(event, SessionEvent::AddToQueue(e) if e.queue_index == pos));
        }
        assert_eq!(replay[7], SessionEvent::BecomeHost);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn lagged_receiver_is_resynced() {
        let dir = tempfile::tempdir().unwrap();
        let state = crowded_state(dir.path()).await;
        let mut rx = state.event_bridge.subscribe();
        for _ in 0..5 {
            state.session.pause("listener-9");
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));

        let (replay, mut fresh) = resync_session(&state);

        assert_eq!(replay.len(), 8);
        assert_eq!(replay[0], SessionEvent::ClearQueue);
        assert!(matches!(&replay[1], SessionEvent::ChangeSong(e) if e.track.id == "0"));
        assert!(matches!(&replay[7], SessionEvent::AddToQueue(e) if e.queue_index == 5));
        assert!(matches!(fresh.try_recv(), Err(TryRecvError::Empty)));

        state.session.clear_queue();
        assert_eq!(fresh.try_recv().unwrap().event, SessionEvent::ClearQueue);
    }
}
