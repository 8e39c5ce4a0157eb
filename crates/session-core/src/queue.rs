//! Track queue + current/previous position.
//!
//! Owns the ordered track list and reports every position change as a [`QueueEvent`]
//! for the session to fan out.

use std::collections::HashSet;

use session_types::Track;

use crate::error::{Result, SessionError};

/// Changes produced by queue mutations, drained with [`QueueManager::take_events`].
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    QueueUpdated { title: String, tracks: Vec<Track> },
    /// The track that was current right before a position change.
    BeforeMetadataChanged(Track),
    MetadataChanged(Track),
    /// The queue was installed without a playable current item.
    MetadataRetrieveError,
}

#[derive(Debug, Default)]
pub struct QueueManager {
    title: String,
    tracks: Vec<Track>,
    current: Option<usize>,
    previous: Option<usize>,
    /// Current track of the queue that the last `replace` swapped out.
    outgoing: Option<Track>,
    events: Vec<QueueEvent>,
}

/// Drop later duplicates by `id`, keeping first-seen order.
pub fn dedup_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}

fn index_in_bounds(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|i| *i < len)
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Current position; `None` when undefined.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Position held before the last move; `None` when undefined.
    pub fn previous_index(&self) -> Option<usize> {
        self.previous
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Decoder source for a queued track id.
    pub fn source_of(&self, id: &str) -> Option<&str> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.source_uri.as_str())
    }

    pub fn position_of(&self, id: &str) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| SessionError::TrackNotFound(id.to_string()))
    }

    pub fn track_at(&self, position: i64) -> Result<&Track> {
        index_in_bounds(position, self.tracks.len())
            .and_then(|i| self.tracks.get(i))
            .ok_or(SessionError::InvalidQueueIndex {
                index: position,
                len: self.tracks.len(),
            })
    }

    /// Install a new track list.
    ///
    /// Duplicated ids are dropped. An empty list is rejected without events. An
    /// out-of-bounds `start_index` leaves the queue without a current item.
    /// Returns `false` when nothing was installed.
    pub fn replace(&mut self, title: &str, tracks: Vec<Track>, start_index: i64) -> bool {
        let tracks = dedup_tracks(tracks);
        if tracks.is_empty() {
            tracing::debug!(title, "empty queue rejected");
            return false;
        }

        self.outgoing = self.current_track().cloned();
        self.title = title.to_string();
        self.tracks = tracks;
        self.previous = None;
        self.current = index_in_bounds(start_index, self.tracks.len());
        if self.current.is_none() {
            tracing::debug!(start_index, len = self.tracks.len(), "queue start index unset");
        }

        self.events.push(QueueEvent::QueueUpdated {
            title: self.title.clone(),
            tracks: self.tracks.clone(),
        });
        if let Some(old) = self.outgoing.take() {
            self.events.push(QueueEvent::BeforeMetadataChanged(old));
        }
        self.push_metadata_event();
        true
    }

    pub fn set_current_by_track_id(&mut self, id: &str) -> bool {
        match self.position_of(id) {
            Ok(index) => self.set_current(index),
            Err(err) => {
                tracing::debug!("{err}");
                false
            }
        }
    }

    pub fn set_current_by_position(&mut self, position: usize) -> bool {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        match self.track_at(position) {
            Ok(_) => self.set_current(position as usize),
            Err(err) => {
                tracing::debug!("{err}");
                false
            }
        }
    }

    /// Move by `delta` without wrapping. Returns `false` (no mutation) past either end.
    pub fn skip(&mut self, delta: i64) -> bool {
        let base = self.current.map(|i| i as i64).unwrap_or(-1);
        let Some(target) = base
            .checked_add(delta)
            .and_then(|t| index_in_bounds(t, self.tracks.len()))
        else {
            return false;
        };
        self.set_current(target)
    }

    /// Drain events produced since the last call.
    pub fn take_events(&mut self) -> Vec<QueueEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_current(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.previous = self.current;
        self.current = Some(index);
        if let Some(old) = self.previous.and_then(|i| self.tracks.get(i)) {
            self.events.push(QueueEvent::BeforeMetadataChanged(old.clone()));
        }
        self.push_metadata_event();
        true
    }

    fn push_metadata_event(&mut self) {
        match self.current_track() {
            Some(track) => {
                let track = track.clone();
                self.events.push(QueueEvent::MetadataChanged(track));
            }
            None => self.events.push(QueueEvent::MetadataRetrieveError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter()
            .map(|id| Track::new(*id, format!("/music/{id}.flac")))
            .collect()
    }

    fn queue(ids: &[&str], start: i64) -> QueueManager {
        let mut q = QueueManager::new();
        assert!(q.replace("test", tracks(ids), start));
        q.take_events();
        q
    }

    #[test]
    fn replace_sets_start_index_and_emits_queue_then_metadata() {
        let mut q = QueueManager::new();
        assert!(q.replace("X", tracks(&["a", "b"]), 1));
        assert_eq!(q.current_index(), Some(1));
        let events = q.take_events();
        assert!(matches!(&events[0], QueueEvent::QueueUpdated { title, tracks } if title == "X" && tracks.len() == 2));
        assert_eq!(events[1], QueueEvent::MetadataChanged(Track::new("b", "/music/b.flac")));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn replace_with_invalid_index_leaves_no_current_item() {
        for start in [-1, -7, 3, 100] {
            let mut q = QueueManager::new();
            assert!(q.replace("t", tracks(&["a", "b", "c"]), start));
            assert_eq!(q.current_index(), None, "start {start}");
            let events = q.take_events();
            assert_eq!(events.last(), Some(&QueueEvent::MetadataRetrieveError));
        }
    }

    #[test]
    fn replace_rejects_empty_list_without_events() {
        let mut q = queue(&["a"], 0);
        assert!(!q.replace("t", Vec::new(), 0));
        assert!(q.take_events().is_empty());
        assert_eq!(q.tracks().len(), 1);
        assert_eq!(q.current_index(), Some(0));
    }

    #[test]
    fn replace_deduplicates_by_id_in_first_seen_order() {
        let mut q = QueueManager::new();
        let mut list = tracks(&["a", "b", "a", "c", "b"]);
        list[2].title = Some("dup".to_string());
        q.replace("t", list, 0);
        let ids: Vec<&str> = q.tracks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(q.tracks()[0].title.is_none());
    }

    #[test]
    fn replace_reports_outgoing_track_once() {
        let mut q = queue(&["a", "b"], 1);
        q.replace("next", tracks(&["c"]), 0);
        let events = q.take_events();
        assert!(events.contains(&QueueEvent::BeforeMetadataChanged(Track::new("b", "/music/b.flac"))));
        q.replace("again", tracks(&["d"]), 0);
        let events = q.take_events();
        assert!(events.contains(&QueueEvent::BeforeMetadataChanged(Track::new("c", "/music/c.flac"))));
        assert!(!events.contains(&QueueEvent::BeforeMetadataChanged(Track::new("b", "/music/b.flac"))));
    }

    #[test]
    fn skip_stops_at_both_ends() {
        let mut q = queue(&["a", "b", "c"], 2);
        assert!(!q.skip(1));
        assert_eq!(q.current_index(), Some(2));
        assert!(q.take_events().is_empty());

        let mut q = queue(&["a", "b", "c"], 0);
        assert!(!q.skip(-1));
        assert_eq!(q.current_index(), Some(0));
        assert!(q.take_events().is_empty());
    }

    #[test]
    fn skip_moves_and_records_previous() {
        let mut q = queue(&["a", "b", "c"], 0);
        assert!(q.skip(1));
        assert_eq!(q.current_index(), Some(1));
        assert_eq!(q.previous_index(), Some(0));
        let events = q.take_events();
        assert_eq!(
            events,
            vec![
                QueueEvent::BeforeMetadataChanged(Track::new("a", "/music/a.flac")),
                QueueEvent::MetadataChanged(Track::new("b", "/music/b.flac")),
            ]
        );
    }

    #[test]
    fn skip_forward_from_unset_index_selects_first() {
        let mut q = queue(&["a", "b"], -1);
        assert!(q.skip(1));
        assert_eq!(q.current_index(), Some(0));
    }

    #[test]
    fn set_current_by_missing_id_is_a_no_op() {
        let mut q = queue(&["a", "b"], 0);
        assert!(q.skip(1));
        q.take_events();
        assert!(!q.set_current_by_track_id("zzz"));
        assert_eq!(q.current_index(), Some(1));
        assert_eq!(q.previous_index(), Some(0));
        assert!(q.take_events().is_empty());
    }

    #[test]
    fn set_current_by_position_validates_bounds() {
        let mut q = queue(&["a", "b"], 0);
        assert!(!q.set_current_by_position(2));
        assert_eq!(q.current_index(), Some(0));
        assert!(q.set_current_by_position(1));
        assert_eq!(q.current_track().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn lookups_report_taxonomy_errors() {
        let q = queue(&["a"], 0);
        assert_eq!(q.source_of("a"), Some("/music/a.flac"));
        assert_eq!(q.source_of("b"), None);
        assert_eq!(q.position_of("b"), Err(SessionError::TrackNotFound("b".to_string())));
        assert_eq!(
            q.track_at(4).map(|t| t.id.clone()),
            Err(SessionError::InvalidQueueIndex { index: 4, len: 1 })
        );
    }
}
