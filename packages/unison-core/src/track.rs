//! Track references and catalog metadata.
//!
//! A [`TrackRef`] is the immutable identity of a track inside the session:
//! catalog id, display fields and the deterministic local file name the
//! Media Resolver stores its audio under.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_COVER_URI, MEDIA_FILE_EXTENSION, UNKNOWN_ARTIST};

/// Characters that are not allowed in local media file names.
const INVALID_FILE_NAME_CHARS: [char; 9] = ['/', '\\', '?', '|', '>', '<', ':', '*', '"'];

/// Strips filesystem-unsafe characters from a title or artist name.
#[must_use]
pub fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !INVALID_FILE_NAME_CHARS.contains(c))
        .collect()
}

/// Builds the local file name for a track from its title and artist.
///
/// Title and artist are sanitized independently before being joined.
#[must_use]
pub fn derive_file_name(title: &str, artist: &str) -> String {
    format!(
        "{}_artist_{}.{}",
        sanitize_file_name(title),
        sanitize_file_name(artist),
        MEDIA_FILE_EXTENSION
    )
}

/// Artist entry as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMeta {
    pub name: String,
}

/// Raw track metadata returned by a catalog source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<ArtistMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_uri: Option<String>,
}

impl TrackMeta {
    /// Name of the primary artist, if the catalog reports one.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }
}

/// Immutable reference to a track shared by every listener.
///
/// Equality is by catalog identifier only. The file name is never taken from
/// the wire: deserialization re-derives it from title and author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "TrackRefWire")]
pub struct TrackRef {
    pub id: String,
    pub title: String,
    /// Primary artist, or [`UNKNOWN_ARTIST`].
    pub author: String,
    pub cover_uri: String,
    pub file_name: String,
}

impl TrackRef {
    /// Creates a track reference, deriving the local file name.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: Option<&str>,
        cover_uri: Option<&str>,
    ) -> Self {
        let title = title.into();
        let author = author
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
            .to_string();
        let file_name = derive_file_name(&title, &author);
        Self {
            id: id.into(),
            title,
            author,
            cover_uri: cover_uri
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_COVER_URI)
                .to_string(),
            file_name,
        }
    }

    /// Builds a reference from catalog metadata.
    pub fn from_meta(meta: &TrackMeta) -> Self {
        Self::new(
            meta.id.clone(),
            meta.title.clone(),
            meta.primary_artist(),
            meta.cover_uri.as_deref(),
        )
    }
}

/// Inbound shape of a track reference (listener commands, snapshot files).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRefWire {
    id: String,
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    cover_uri: Option<String>,
}

impl From<TrackRefWire> for TrackRef {
    fn from(wire: TrackRefWire) -> Self {
        Self::new(
            wire.id,
            wire.title,
            wire.author.as_deref(),
            wire.cover_uri.as_deref(),
        )
    }
}

impl PartialEq for TrackRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TrackRef {}

/// A track at a position in the shared queue.
///
/// Serialized flat so listeners receive `{id, title, ..., queueIndex}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(flatten)]
    pub track: TrackRef,
    pub queue_index: usize,
}

impl QueueEntry {
    pub fn new(track: TrackRef, queue_index: usize) -> Self {
        Self { track, queue_index }
    }
}
