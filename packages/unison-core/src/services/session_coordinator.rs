//! Session Coordinator: the single owner of shared playback state.
//!
//! Every command runs against one `parking_lot::Mutex<SessionState>`. The lock
//! is never held across media resolution: commands read their target under the
//! lock, release it while the resolver works, then re-acquire it and commit
//! against whatever the state is by then. Events are emitted while the lock is
//! held so every listener observes them in commit order.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::catalog::{describe_failures, CatalogChain};
use crate::events::{EventEmitter, SessionEvent};
use crate::services::media_resolver::MediaResolver;
use crate::services::presence::{Listener, Presence};
use crate::services::queue_store::QueueStore;
use crate::track::{QueueEntry, TrackRef};

/// How many times a selection re-reads state after resolving before giving up.
///
/// Each retry only happens if the target changed during a download.
const MAX_SELECTION_ATTEMPTS: usize = 3;

/// Point-in-time view of the session for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub current: Option<QueueEntry>,
    pub current_index: Option<usize>,
    pub queue: Vec<QueueEntry>,
    pub listeners: Vec<Listener>,
    pub host: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    queue: QueueStore,
    /// Meaningful only while the queue is non-empty.
    cursor: usize,
    /// May name an entry that a later `ClearQueue` removed.
    current: Option<QueueEntry>,
    presence: Presence,
}

impl SessionState {
    fn current_index(&self) -> Option<usize> {
        (!self.queue.is_empty()).then_some(self.cursor)
    }

    /// Current track followed by every queue entry.
    fn replay(&self) -> Vec<SessionEvent> {
        self.current
            .iter()
            .cloned()
            .map(SessionEvent::ChangeSong)
            .chain(self.queue.entries().iter().cloned().map(SessionEvent::AddToQueue))
            .collect()
    }

    fn select(&mut self, index: usize) -> Option<QueueEntry> {
        let entry = self.queue.get(index)?.clone();
        self.cursor = index;
        self.current = Some(entry.clone());
        Some(entry)
    }
}

/// Serializes listener commands against the shared session.
pub struct SessionCoordinator {
    state: Mutex<SessionState>,
    resolver: Arc<MediaResolver>,
    catalog: CatalogChain,
    emitter: Arc<dyn EventEmitter>,
}

impl SessionCoordinator {
    pub fn new(
        resolver: Arc<MediaResolver>,
        catalog: CatalogChain,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            resolver,
            catalog,
            emitter,
        }
    }

    /// Seeds the queue (startup snapshot). Positions are assigned densely.
    #[must_use]
    pub fn with_queue(mut self, tracks: Vec<TrackRef>) -> Self {
        self.state.get_mut().queue = QueueStore::from_tracks(tracks);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Presence
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers `connection_id` and returns the state it must be shown.
    ///
    /// The replay is the current track (if any), every queue entry in order,
    /// then `BecomeHost` if nobody held host. `subscribe` runs under the same
    /// lock, so a subscription taken there sees exactly the events committed
    /// after the replay. The caller writes the replay to the listener itself;
    /// none of it goes through the emitter.
    pub fn join_with<S>(
        &self,
        connection_id: &str,
        subscribe: impl FnOnce() -> S,
    ) -> (Vec<SessionEvent>, S) {
        let mut state = self.state.lock();
        let mut replay = state.replay();
        if state.presence.join(connection_id) {
            replay.push(SessionEvent::BecomeHost);
        }
        let subscription = subscribe();
        log::debug!(
            "[Presence] {} joined, replaying {} event(s)",
            connection_id,
            replay.len()
        );
        (replay, subscription)
    }

    /// Rebuilds a listener's view after it missed events.
    ///
    /// Returns `ClearQueue`, the current track and the queue, with `subscribe`
    /// taken under the same lock as in [`join_with`](Self::join_with).
    pub fn resync_with<S>(&self, subscribe: impl FnOnce() -> S) -> (Vec<SessionEvent>, S) {
        let state = self.state.lock();
        let mut events = vec![SessionEvent::ClearQueue];
        events.extend(state.replay());
        (events, subscribe())
    }

    /// Removes `connection_id`, handing host to the earliest remaining listener.
    pub fn leave(&self, connection_id: &str) {
        let mut state = self.state.lock();
        if let Some(new_host) = state.presence.leave(connection_id) {
            self.emitter.unicast(&new_host, SessionEvent::BecomeHost);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Plays `track`, appending it to the queue if it is not already there.
    ///
    /// Returns the new current entry, or `None` if the audio could not be
    /// resolved (the session is left untouched).
    pub async fn change_song(&self, track: TrackRef) -> Option<QueueEntry> {
        if let Err(e) = self.resolver.ensure_local(&track).await {
            log::warn!("[Session] ChangeSong {} not played: {}", track.id, e);
            return None;
        }

        let mut state = self.state.lock();
        let index = match state.queue.index_of(&track.id) {
            Some(index) => index,
            None => {
                let index = state.queue.append(track.clone());
                self.emitter
                    .broadcast(SessionEvent::AddToQueue(QueueEntry::new(track, index)));
                index
            }
        };

        let entry = state.select(index)?;
        log::info!("[Session] Now playing {} at {}", entry.track.id, index);
        self.emitter.broadcast(SessionEvent::ChangeSong(entry.clone()));
        Some(entry)
    }

    /// Plays the entry at `index`. Out-of-range indexes are ignored.
    pub async fn change_song_by_index(&self, index: i64) -> Option<QueueEntry> {
        let Ok(index) = usize::try_from(index) else {
            log::debug!("[Session] ChangeSongByIndex ignored: negative index {}", index);
            return None;
        };
        self.select_with("ChangeSongByIndex", move |state| {
            (index < state.queue.len()).then_some(index)
        })
        .await
    }

    /// Advances to the next entry, wrapping to the start.
    pub async fn next(&self) -> Option<QueueEntry> {
        self.select_with("Next", |state| state.queue.next_index(state.cursor))
            .await
    }

    /// Steps back to the previous entry, wrapping to the end.
    pub async fn previous(&self) -> Option<QueueEntry> {
        self.select_with("Previous", |state| state.queue.previous_index(state.cursor))
            .await
    }

    /// Selects the entry chosen by `pick`, resolving its audio first.
    ///
    /// The lock is released while the resolver checks (and if needed fetches)
    /// the file. On re-acquiring it `pick` is evaluated again; the selection
    /// commits only if it still names the same track.
    async fn select_with<F>(&self, action: &str, pick: F) -> Option<QueueEntry>
    where
        F: Fn(&SessionState) -> Option<usize> + Send,
    {
        for _ in 0..MAX_SELECTION_ATTEMPTS {
            let target = {
                let state = self.state.lock();
                let Some(index) = pick(&*state) else {
                    log::debug!("[Session] {} ignored: no target", action);
                    return None;
                };
                state.queue.get(index)?.track.clone()
            };

            if let Err(e) = self.resolver.ensure_local(&target).await {
                log::warn!("[Session] {} skipped {}: {}", action, target.id, e);
                return None;
            }

            let mut state = self.state.lock();
            let Some(index) = pick(&*state) else {
                log::debug!("[Session] {} ignored: no target", action);
                return None;
            };
            if state.queue.get(index).is_some_and(|e| e.track == target) {
                let entry = state.select(index)?;
                log::info!("[Session] {}: now playing {} at {}", action, entry.track.id, index);
                self.emitter.broadcast(SessionEvent::ChangeSong(entry.clone()));
                return Some(entry);
            }
        }

        log::warn!(
            "[Session] {} abandoned: target kept changing while resolving",
            action
        );
        None
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Appends `track`, broadcasts it, then resolves its audio.
    ///
    /// If the queue was empty before this call the new entry starts playing.
    /// Returns the entry's position.
    pub async fn add_to_queue(&self, track: TrackRef) -> usize {
        let (entry, was_first) = {
            let mut state = self.state.lock();
            let index = state.queue.append(track.clone());
            let entry = QueueEntry::new(track, index);
            self.emitter.broadcast(SessionEvent::AddToQueue(entry.clone()));
            (entry, state.queue.len() == 1)
        };
        log::debug!("[Session] Queued {} at {}", entry.track.id, entry.queue_index);

        if let Err(e) = self.resolver.ensure_local(&entry.track).await {
            log::warn!("[Session] Queued track {} unavailable: {}", entry.track.id, e);
            return entry.queue_index;
        }

        if was_first {
            self.change_song_by_index(0).await;
        }
        entry.queue_index
    }

    /// Empties the queue and resets the cursor. The current track keeps playing.
    pub fn clear_queue(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.cursor = 0;
        self.emitter.broadcast(SessionEvent::ClearQueue);
        log::info!("[Session] Queue cleared");
    }

    /// Replaces the queue with every linked account's liked tracks, shuffled.
    ///
    /// Tracks are added one at a time, so listeners watch the queue fill.
    /// Returns how many tracks were queued.
    pub async fn shuffle_all(&self) -> usize {
        self.clear_queue();

        let mut liked = match self.catalog.liked_tracks().await {
            Ok(liked) => liked,
            Err(failures) => {
                log::warn!(
                    "[Session] ShuffleAll found no library: {}",
                    describe_failures(&failures)
                );
                return 0;
            }
        };
        liked.shuffle(&mut rand::thread_rng());
        log::info!("[Session] Shuffling {} liked track(s)", liked.len());

        for meta in &liked {
            self.add_to_queue(TrackRef::from_meta(meta)).await;
        }
        liked.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Tells every other listener to pause.
    pub fn pause(&self, sender: &str) {
        let _state = self.state.lock();
        self.emitter.broadcast_except(sender, SessionEvent::PauseSong);
    }

    /// Tells every other listener to play from `time_offset` seconds.
    ///
    /// Negative or non-finite offsets are ignored.
    pub fn play_at(&self, sender: &str, time_offset: f64) {
        if !time_offset.is_finite() || time_offset < 0.0 {
            log::debug!("[Session] PlayAt ignored: bad offset {}", time_offset);
            return;
        }
        let _state = self.state.lock();
        self.emitter
            .broadcast_except(sender, SessionEvent::PlaySong { time_offset });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns a consistent copy of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            current: state.current.clone(),
            current_index: state.current_index(),
            queue: state.queue.entries().to_vec(),
            listeners: state.presence.listeners().to_vec(),
            host: state.presence.host().map(str::to_string),
        }
    }

    /// Tracks in the queue, in order (for the shutdown snapshot).
    pub fn queue_tracks(&self) -> Vec<TrackRef> {
        self.state.lock().queue.tracks()
    }

    /// Resolver shared with the HTTP layer.
    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    /// Catalog chain shared with the HTTP layer.
    pub fn catalog(&self) -> &CatalogChain {
        &self.catalog
    }
}
