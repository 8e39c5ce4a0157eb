//! Console "now playing" surface and service lifecycle hooks.

use std::sync::Mutex;

use session_core::sinks::{NotificationSink, PlaybackServiceCallbacks};
use session_types::{PlaybackSnapshot, PlaybackStateKind, Track};

/// Logs now-playing changes, collapsing repeats of the same line.
#[derive(Debug, Default)]
pub struct LogNotifier {
    last: Mutex<Option<String>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One-line description used by the notifier and the console `status` command.
pub fn now_playing_line(track: Option<&Track>, snapshot: &PlaybackSnapshot) -> String {
    let marker = match snapshot.state {
        PlaybackStateKind::Playing => ">",
        PlaybackStateKind::Paused => "||",
        PlaybackStateKind::Buffering => "..",
        PlaybackStateKind::Error => "!",
        PlaybackStateKind::Stopped | PlaybackStateKind::None => "[]",
    };
    let Some(track) = track else {
        return format!("{marker} (nothing queued)");
    };
    match track.artist.as_deref() {
        Some(artist) => format!("{marker} {} - {}", artist, track.display_title()),
        None => format!("{marker} {}", track.display_title()),
    }
}

impl NotificationSink for LogNotifier {
    fn show_now_playing(&self, track: Option<&Track>, snapshot: &PlaybackSnapshot) {
        let line = now_playing_line(track, snapshot);
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.as_deref() == Some(line.as_str()) {
            return;
        }
        tracing::info!(position_ms = snapshot.position_ms, "{line}");
        *last = Some(line);
    }

    fn hide_now_playing(&self) {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.take().is_some() {
            tracing::info!("playback stopped");
        }
    }
}

impl PlaybackServiceCallbacks for LogNotifier {
    fn on_playback_start(&self) {
        tracing::debug!("service: playback start");
    }

    fn on_playback_pause(&self) {
        tracing::debug!("service: playback pause");
    }

    fn on_playback_stop(&self) {
        tracing::debug!("service: playback stop");
    }
}
