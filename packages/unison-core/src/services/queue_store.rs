//! Ordered play queue with dense positions.
//!
//! Every entry's `queue_index` equals its position in the backing vector at
//! all times. The cursor is owned by the session, not by the store.

use crate::track::{QueueEntry, TrackRef};

/// The shared play order.
#[derive(Debug, Default, Clone)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
}

impl QueueStore {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue from tracks in order, assigning dense positions.
    pub fn from_tracks(tracks: impl IntoIterator<Item = TrackRef>) -> Self {
        let mut queue = Self::new();
        for track in tracks {
            queue.append(track);
        }
        queue
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `track` at the end and returns its position.
    pub fn append(&mut self, track: TrackRef) -> usize {
        let index = self.entries.len();
        self.entries.push(QueueEntry::new(track, index));
        index
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the entry at `index`, or `None` outside `[0, len)`.
    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    /// Finds a track's position by catalog id.
    pub fn index_of(&self, track_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.track.id == track_id)
    }

    /// Position after `current`, wrapping to 0. `None` on an empty queue.
    pub fn next_index(&self, current: usize) -> Option<usize> {
        let len = self.entries.len();
        (len > 0).then(|| (current % len + 1) % len)
    }

    /// Position before `current`, wrapping to the end. `None` on an empty queue.
    pub fn previous_index(&self, current: usize) -> Option<usize> {
        let len = self.entries.len();
        (len > 0).then(|| (current % len + len - 1) % len)
    }

    /// All entries in play order.
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Tracks in play order, without positions.
    pub fn tracks(&self) -> Vec<TrackRef> {
        self.entries.iter().map(|e| e.track.clone()).collect()
    }
}
