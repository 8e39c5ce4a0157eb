//! Outbound collaborators the session calls into.

use session_types::{PlaybackSnapshot, Track};

/// Persists "last position" for a track the session switched away from.
pub trait SaveRecordSink: Send + Sync {
    fn on_save_record(&self, track: &Track, position_ms: u64);
}

/// Drives the "now playing" surface (system notification, tray, console line).
pub trait NotificationSink: Send + Sync {
    fn show_now_playing(&self, track: Option<&Track>, snapshot: &PlaybackSnapshot);
    fn hide_now_playing(&self);
}

/// Lifecycle hooks for the hosting service.
pub trait PlaybackServiceCallbacks: Send + Sync {
    fn on_playback_start(&self) {}
    fn on_playback_pause(&self) {}
    fn on_playback_stop(&self) {}
}
