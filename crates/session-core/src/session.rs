//! Session orchestrator.
//!
//! [`Session`] owns the queue, the engine and the event bus and processes exactly one
//! [`SessionMessage`] at a time: client commands, decoder callbacks and focus changes all
//! arrive through the same stream. After each message the queue and engine outboxes are
//! drained and translated into [`SessionEvent`]s and collaborator calls.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::Sender;
use session_types::{
    AVAILABLE_ACTIONS, Command, FocusState, PlaybackSnapshot, PlaybackStateKind, QueueRequest,
    SessionEvent, Track, same_ids,
};

use crate::config::SessionConfig;
use crate::decoder::{DecoderEvent, DecoderFactory, KeepAliveLock, NoopKeepAlive};
use crate::engine::{EngineEvent, PlaybackEngine};
use crate::events::EventBus;
use crate::focus::AudioFocus;
use crate::queue::{QueueEvent, QueueManager, dedup_tracks};
use crate::sinks::{NotificationSink, PlaybackServiceCallbacks, SaveRecordSink};

const METADATA_ERROR: &str = "Unable to retrieve metadata.";

/// Everything the session serializes.
#[derive(Debug)]
pub enum SessionMessage {
    Command(Command),
    Decoder { generation: u64, event: DecoderEvent },
    Focus(FocusState),
    Shutdown,
}

/// External capabilities a session is built from.
pub struct Collaborators {
    pub decoders: Box<dyn DecoderFactory>,
    pub focus: Box<dyn AudioFocus>,
    pub keep_alive: Box<dyn KeepAliveLock>,
    pub records: Option<Arc<dyn SaveRecordSink>>,
    pub notifications: Option<Arc<dyn NotificationSink>>,
    pub service: Option<Arc<dyn PlaybackServiceCallbacks>>,
}

impl Collaborators {
    pub fn new(decoders: Box<dyn DecoderFactory>, focus: Box<dyn AudioFocus>) -> Self {
        Self {
            decoders,
            focus,
            keep_alive: Box::new(NoopKeepAlive::default()),
            records: None,
            notifications: None,
            service: None,
        }
    }

    pub fn with_keep_alive(mut self, lock: Box<dyn KeepAliveLock>) -> Self {
        self.keep_alive = lock;
        self
    }

    pub fn with_record_sink(mut self, sink: Arc<dyn SaveRecordSink>) -> Self {
        self.records = Some(sink);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }

    pub fn with_service_callbacks(mut self, callbacks: Arc<dyn PlaybackServiceCallbacks>) -> Self {
        self.service = Some(callbacks);
        self
    }
}

/// Position of the track being switched away from, published once the switch is done.
#[derive(Clone, Debug)]
struct SaveRecord {
    track: Track,
    position_ms: u64,
}

pub struct Session {
    config: SessionConfig,
    queue: QueueManager,
    engine: PlaybackEngine,
    bus: EventBus,
    /// Last track handed to the engine.
    playing_track_id: Option<String>,
    pending_save_record: Option<SaveRecord>,
    started_at: Instant,
    last_snapshot: Arc<Mutex<PlaybackSnapshot>>,
    records: Option<Arc<dyn SaveRecordSink>>,
    notifications: Option<Arc<dyn NotificationSink>>,
    service: Option<Arc<dyn PlaybackServiceCallbacks>>,
}

impl Session {
    /// Build a session whose asynchronous callbacks re-enter through `tx`.
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        tx: Sender<SessionMessage>,
    ) -> Self {
        let config = config.normalized();
        let engine = PlaybackEngine::new(
            &config,
            collaborators.decoders,
            collaborators.focus,
            collaborators.keep_alive,
            tx,
        );
        Self {
            config,
            queue: QueueManager::new(),
            engine,
            bus: EventBus::new(),
            playing_track_id: None,
            pending_save_record: None,
            started_at: Instant::now(),
            last_snapshot: Arc::new(Mutex::new(PlaybackSnapshot {
                speed: 1.0,
                actions: AVAILABLE_ACTIONS.to_vec(),
                ..PlaybackSnapshot::default()
            })),
            records: collaborators.records,
            notifications: collaborators.notifications,
            service: collaborators.service,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn playing_track_id(&self) -> Option<&str> {
        self.playing_track_id.as_deref()
    }

    /// Shared cell holding the last published snapshot.
    pub fn snapshot_cell(&self) -> Arc<Mutex<PlaybackSnapshot>> {
        self.last_snapshot.clone()
    }

    /// Process one message to completion, including listener fan-out.
    pub fn handle(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::Command(cmd) => self.handle_command(cmd),
            SessionMessage::Decoder { generation, event } => {
                self.engine.on_decoder_event(generation, event)
            }
            SessionMessage::Focus(state) => self.engine.on_focus_changed(state),
            SessionMessage::Shutdown => self.shutdown(),
        }
        self.dispatch();
    }

    /// Stop playback and release every engine resource.
    pub fn shutdown(&mut self) {
        tracing::info!("session shutting down");
        self.handle_stop_request();
        self.dispatch();
    }

    fn handle_command(&mut self, cmd: Command) {
        tracing::debug!(?cmd, "session command");
        match cmd {
            Command::Play => self.handle_play_request(),
            Command::Pause => self.handle_pause_request(),
            Command::Stop => self.handle_stop_request(),
            Command::SeekTo { position_ms } => self.engine.seek_to(position_ms),
            Command::SkipNext => self.move_and_play(|q| q.skip(1)),
            Command::SkipPrevious => self.move_and_play(|q| q.skip(-1)),
            Command::PlayFromId { id } => self.move_and_play(|q| q.set_current_by_track_id(&id)),
            Command::SkipToQueueItem { position } => {
                self.move_and_play(|q| q.set_current_by_position(position))
            }
            Command::PlayQueue(req) => self.play_queue(req),
            Command::UpdateQueue(req) => self.update_queue(req),
            Command::ResetQueue(req) => self.reset_queue(req),
        }
    }

    fn handle_play_request(&mut self) {
        let Some(track) = self.queue.current_track().cloned() else {
            tracing::debug!("play requested without a current queue item");
            self.engine.start();
            return;
        };
        if let Some(service) = &self.service {
            service.on_playback_start();
        }
        let same = self.playing_track_id.as_deref() == Some(track.id.as_str());
        match self.engine.state() {
            PlaybackStateKind::Playing if same => {
                tracing::debug!(track_id = %track.id, "already playing");
            }
            PlaybackStateKind::Paused if same => self.engine.start(),
            _ => {
                tracing::info!(track_id = %track.id, title = track.display_title(), "starting track");
                self.engine.play(&track.source_uri);
            }
        }
        self.playing_track_id = Some(track.id);
    }

    fn handle_pause_request(&mut self) {
        if !self.engine.is_playing() {
            tracing::debug!(state = ?self.engine.state(), "pause ignored; not playing");
            return;
        }
        self.engine.pause();
        if let Some(service) = &self.service {
            service.on_playback_pause();
        }
    }

    fn handle_stop_request(&mut self) {
        self.engine.stop(true);
        if let Some(service) = &self.service {
            service.on_playback_stop();
        }
        if let Some(notifications) = &self.notifications {
            notifications.hide_now_playing();
        }
    }

    /// Record the outgoing position, move within the queue and play the new item if the
    /// move succeeded.
    fn move_and_play(&mut self, mv: impl FnOnce(&mut QueueManager) -> bool) {
        self.capture_save_record();
        let moved = mv(&mut self.queue);
        self.flush_save_record();
        if moved {
            self.handle_play_request();
        } else {
            tracing::debug!("queue move rejected");
        }
    }

    fn play_queue(&mut self, req: QueueRequest) {
        let tracks = dedup_tracks(req.tracks);
        if tracks.is_empty() {
            tracing::debug!("empty play queue request ignored");
            return;
        }
        if same_ids(&tracks, self.queue.tracks()) {
            match self.queue.track_at(req.index).map(|t| t.id.clone()) {
                Ok(id) => self.move_and_play(|q| q.set_current_by_track_id(&id)),
                Err(err) => tracing::debug!("{err}"),
            }
            return;
        }
        let title = self.queue_title(req.title);
        self.capture_save_record();
        self.queue.replace(&title, tracks, req.index);
        self.flush_save_record();
        if self.queue.current_index().is_some() {
            self.handle_play_request();
        }
    }

    fn update_queue(&mut self, req: QueueRequest) {
        let tracks = dedup_tracks(req.tracks);
        if tracks.is_empty() || same_ids(&tracks, self.queue.tracks()) {
            tracing::debug!("queue update ignored");
            return;
        }
        let title = self.queue_title(req.title);
        self.capture_save_record();
        self.queue.replace(&title, tracks, req.index);
        self.flush_save_record();
    }

    fn reset_queue(&mut self, req: QueueRequest) {
        // The `Stopped` status records the outgoing track.
        self.handle_stop_request();
        self.dispatch();
        let title = self.queue_title(req.title);
        self.queue.replace(&title, req.tracks, req.index);
    }

    fn queue_title(&self, title: Option<String>) -> String {
        title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.config.default_queue_title.clone())
    }

    fn capture_save_record(&mut self) {
        self.pending_save_record = self.queue.current_track().map(|track| SaveRecord {
            track: track.clone(),
            position_ms: self.engine.position_ms(),
        });
    }

    fn flush_save_record(&mut self) {
        if let Some(record) = self.pending_save_record.take() {
            self.publish_save_record(record.track, record.position_ms);
        }
    }

    /// Save-position for whatever is current right now.
    fn record_save_position(&mut self) {
        if let Some(track) = self.queue.current_track().cloned() {
            let position_ms = self.engine.position_ms();
            self.publish_save_record(track, position_ms);
        }
    }

    fn publish_save_record(&self, track: Track, position_ms: u64) {
        tracing::debug!(track_id = %track.id, position_ms, "save record");
        if let Some(records) = &self.records {
            records.on_save_record(&track, position_ms);
        }
        self.bus
            .publish(SessionEvent::SaveRecordRequested { track, position_ms });
    }

    /// Drain queue and engine outboxes until both are empty.
    fn dispatch(&mut self) {
        loop {
            let queue_events = self.queue.take_events();
            let engine_events = self.engine.take_events();
            if queue_events.is_empty() && engine_events.is_empty() {
                break;
            }
            for event in queue_events {
                self.on_queue_event(event);
            }
            for event in engine_events {
                self.on_engine_event(event);
            }
        }
    }

    fn on_queue_event(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::QueueUpdated { title, tracks } => {
                tracing::info!(title = %title, len = tracks.len(), "queue updated");
                self.bus.publish(SessionEvent::QueueChanged { title, tracks });
            }
            QueueEvent::BeforeMetadataChanged(track) => {
                tracing::debug!(track_id = %track.id, "leaving track");
            }
            QueueEvent::MetadataChanged(track) => {
                self.bus.publish(SessionEvent::MetadataChanged { track });
            }
            QueueEvent::MetadataRetrieveError => {
                self.publish_snapshot(Some(METADATA_ERROR));
            }
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StatusChanged(state) => {
                self.publish_snapshot(None);
                if matches!(state, PlaybackStateKind::Paused | PlaybackStateKind::Stopped) {
                    self.record_save_position();
                }
            }
            EngineEvent::Completion => {
                self.capture_save_record();
                let advanced = self.queue.skip(1);
                self.flush_save_record();
                if advanced {
                    self.handle_play_request();
                } else {
                    tracing::info!("end of queue");
                    self.handle_stop_request();
                }
            }
            EngineEvent::Error(_) => {
                self.publish_snapshot(None);
                self.record_save_position();
            }
        }
    }

    fn publish_snapshot(&mut self, error: Option<&str>) {
        let state = if error.is_some() {
            PlaybackStateKind::Error
        } else {
            self.engine.state()
        };
        let snapshot = PlaybackSnapshot {
            state,
            position_ms: self.engine.position_ms(),
            speed: self.engine.speed(),
            updated_at_ms: self.started_at.elapsed().as_millis() as u64,
            active_track_id: self.queue.current_track().map(|t| t.id.clone()),
            error: error
                .or_else(|| {
                    (state == PlaybackStateKind::Error)
                        .then(|| self.engine.error())
                        .flatten()
                })
                .map(str::to_string),
            actions: AVAILABLE_ACTIONS.to_vec(),
        };
        *self
            .last_snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
        self.bus
            .publish(SessionEvent::PlaybackStateChanged(snapshot.clone()));

        if matches!(state, PlaybackStateKind::Playing | PlaybackStateKind::Paused) {
            if let Some(notifications) = &self.notifications {
                notifications.show_now_playing(self.queue.current_track(), &snapshot);
            }
            self.bus.publish(SessionEvent::NotificationRequired);
        }
    }
}
