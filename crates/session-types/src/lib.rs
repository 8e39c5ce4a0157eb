use serde::{Deserialize, Serialize};

/// Immutable description of one playable item.
///
/// Identity is `id`; two queues are "the same" when their ordered id sequences match.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    /// Unique, stable identifier.
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Track-level artwork location.
    pub art_uri: Option<String>,
    /// Album-level artwork location.
    pub album_art_uri: Option<String>,
    pub genre: Option<String>,
    /// Location handed to the decoder.
    pub source_uri: String,
    /// Total duration in milliseconds, when known.
    pub duration_ms: Option<u64>,
    /// Free-form licensing marker carried through from the client.
    pub pay_type: Option<String>,
}

impl Track {
    /// Build a track with only the fields the engine needs.
    pub fn new(id: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_uri: source_uri.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title when present, otherwise the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Compare two track lists by ordered id sequence.
pub fn same_ids(a: &[Track], b: &[Track]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id == y.id)
}

/// Playback state reported by the engine.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStateKind {
    /// Nothing has been loaded yet.
    #[default]
    None,
    Stopped,
    /// A load or seek is outstanding.
    Buffering,
    Playing,
    Paused,
    /// The decoder failed; details travel in [`PlaybackSnapshot::error`].
    Error,
}

/// Exclusive audio-output focus as last reported by the platform.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FocusState {
    #[default]
    None,
    Gained,
    LostPermanently,
    LostTransient,
    LostTransientCanDuck,
}

/// Transport actions a client may invoke.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    Play,
    Pause,
    PlayPause,
    Stop,
    SeekTo,
    SkipToNext,
    SkipToPrevious,
    PlayFromId,
    SkipToQueueItem,
}

/// Actions advertised with every snapshot.
pub const AVAILABLE_ACTIONS: [PlaybackAction; 9] = [
    PlaybackAction::Play,
    PlaybackAction::Pause,
    PlaybackAction::PlayPause,
    PlaybackAction::Stop,
    PlaybackAction::SeekTo,
    PlaybackAction::SkipToNext,
    PlaybackAction::SkipToPrevious,
    PlaybackAction::PlayFromId,
    PlaybackAction::SkipToQueueItem,
];

/// Externally reportable playback state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackStateKind,
    /// Playback offset in milliseconds.
    pub position_ms: u64,
    /// Playback rate; `1.0` is normal speed.
    pub speed: f32,
    /// Monotonic milliseconds since the session started.
    pub updated_at_ms: u64,
    /// Id of the current queue item, if any.
    pub active_track_id: Option<String>,
    /// Error text when `state` is [`PlaybackStateKind::Error`].
    pub error: Option<String>,
    pub actions: Vec<PlaybackAction>,
}

/// A queue replacement request payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueRequest {
    pub title: Option<String>,
    pub tracks: Vec<Track>,
    /// Start position; `-1` leaves the queue without a current item.
    pub index: i64,
}

/// Client commands accepted by a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Play,
    Pause,
    Stop,
    SeekTo { position_ms: u64 },
    SkipNext,
    SkipPrevious,
    PlayFromId { id: String },
    SkipToQueueItem { position: usize },
    PlayQueue(QueueRequest),
    UpdateQueue(QueueRequest),
    ResetQueue(QueueRequest),
}

/// Events fanned out to session observers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    PlaybackStateChanged(PlaybackSnapshot),
    MetadataChanged { track: Track },
    QueueChanged { title: String, tracks: Vec<Track> },
    SaveRecordRequested { track: Track, position_ms: u64 },
    NotificationRequired,
}
