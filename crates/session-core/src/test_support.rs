//! Scripted collaborators for driving the engine and session in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use session_types::{
    Command, FocusState, PlaybackSnapshot, PlaybackStateKind, QueueRequest, SessionEvent, Track,
};

use crate::config::SessionConfig;
use crate::decoder::{Decoder, DecoderCallbacks, DecoderFactory, KeepAliveLock};
use crate::error::{Result, SessionError};
use crate::focus::{AudioFocus, FocusNotifier, FocusRequest};
use crate::session::{Collaborators, Session, SessionMessage};
use crate::sinks::{NotificationSink, PlaybackServiceCallbacks, SaveRecordSink};

pub(crate) const TRACK_LENGTH_MS: u64 = 600_000;

/// Shared view into every fake: a call log plus knobs the test can turn.
#[derive(Clone, Default)]
pub(crate) struct Probe {
    calls: Arc<Mutex<Vec<String>>>,
    position: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
    fail_load: Arc<AtomicBool>,
    lock_held: Arc<AtomicBool>,
    callbacks: Arc<Mutex<Option<DecoderCallbacks>>>,
    records: Arc<Mutex<Vec<(String, u64)>>>,
}

impl Probe {
    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn set_position(&self, position_ms: u64) {
        self.position.store(position_ms, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    /// Callbacks of the most recently created decoder.
    pub(crate) fn callbacks(&self) -> DecoderCallbacks {
        self.callbacks
            .lock()
            .unwrap()
            .clone()
            .expect("no decoder created yet")
    }

    pub(crate) fn records(&self) -> Vec<(String, u64)> {
        self.records.lock().unwrap().clone()
    }
}

pub(crate) struct FakeFactory {
    probe: Probe,
}

impl FakeFactory {
    pub(crate) fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

impl DecoderFactory for FakeFactory {
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>> {
        let generation = callbacks.generation();
        self.probe.push(format!("create#{generation}"));
        self.probe.set_position(0);
        self.probe.playing.store(false, Ordering::SeqCst);
        *self.probe.callbacks.lock().unwrap() = Some(callbacks);
        Ok(Box::new(FakeDecoder {
            probe: self.probe.clone(),
            generation,
        }))
    }
}

struct FakeDecoder {
    probe: Probe,
    generation: u64,
}

impl Decoder for FakeDecoder {
    fn load(&mut self, source: &str) -> Result<()> {
        self.probe.push(format!("load#{} {source}", self.generation));
        if self.probe.fail_load.swap(false, Ordering::SeqCst) {
            return Err(SessionError::DecoderLoad(format!("unsupported source {source}")));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.probe.push(format!("start#{}", self.generation));
        self.probe.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.probe.push(format!("pause#{}", self.generation));
        self.probe.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.probe.push(format!("seek#{} {position_ms}", self.generation));
        self.probe.set_position(position_ms);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.probe.push(format!("volume#{} {volume}", self.generation));
    }

    fn position_ms(&self) -> u64 {
        self.probe.position.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> Option<u64> {
        Some(TRACK_LENGTH_MS)
    }

    fn is_playing(&self) -> bool {
        self.probe.playing.load(Ordering::SeqCst)
    }

    fn release(&mut self) {
        self.probe.push(format!("release#{}", self.generation));
        self.probe.playing.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct FakeFocus {
    probe: Probe,
}

impl FakeFocus {
    pub(crate) fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

impl AudioFocus for FakeFocus {
    fn request(&mut self, _notifier: FocusNotifier) -> FocusRequest {
        self.probe.push("focus.request");
        FocusRequest::Granted
    }

    fn abandon(&mut self) {
        self.probe.push("focus.abandon");
    }
}

pub(crate) struct FakeKeepAlive {
    probe: Probe,
}

impl FakeKeepAlive {
    pub(crate) fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

impl KeepAliveLock for FakeKeepAlive {
    fn acquire(&mut self) {
        self.probe.push("lock.acquire");
        self.probe.lock_held.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) {
        if self.probe.lock_held.swap(false, Ordering::SeqCst) {
            self.probe.push("lock.release");
        }
    }

    fn is_held(&self) -> bool {
        self.probe.lock_held.load(Ordering::SeqCst)
    }
}

/// Record, notification and service sink in one.
pub(crate) struct RecordingSinks {
    probe: Probe,
}

impl SaveRecordSink for RecordingSinks {
    fn on_save_record(&self, track: &Track, position_ms: u64) {
        self.probe
            .records
            .lock()
            .unwrap()
            .push((track.id.clone(), position_ms));
    }
}

impl NotificationSink for RecordingSinks {
    fn show_now_playing(&self, _track: Option<&Track>, _snapshot: &PlaybackSnapshot) {
        self.probe.push("notify.show");
    }

    fn hide_now_playing(&self) {
        self.probe.push("notify.hide");
    }
}

impl PlaybackServiceCallbacks for RecordingSinks {
    fn on_playback_start(&self) {
        self.probe.push("service.start");
    }

    fn on_playback_pause(&self) {
        self.probe.push("service.pause");
    }

    fn on_playback_stop(&self) {
        self.probe.push("service.stop");
    }
}

pub(crate) fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter()
        .map(|id| Track::new(*id, format!("/music/{id}.flac")).with_title(id.to_uppercase()))
        .collect()
}

pub(crate) fn queue_request(ids: &[&str], index: i64) -> QueueRequest {
    QueueRequest {
        title: Some("test queue".to_string()),
        tracks: tracks(ids),
        index,
    }
}

/// A synchronous session wired to fakes; callbacks are pumped by hand.
pub(crate) struct Harness {
    pub(crate) session: Session,
    pub(crate) probe: Probe,
    rx: Receiver<SessionMessage>,
    events: Receiver<SessionEvent>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let probe = Probe::default();
        let sinks = Arc::new(RecordingSinks {
            probe: probe.clone(),
        });
        let collaborators = Collaborators::new(
            Box::new(FakeFactory::new(probe.clone())),
            Box::new(FakeFocus::new(probe.clone())),
        )
        .with_keep_alive(Box::new(FakeKeepAlive::new(probe.clone())))
        .with_record_sink(sinks.clone())
        .with_notification_sink(sinks.clone())
        .with_service_callbacks(sinks);
        let (tx, rx) = crossbeam_channel::unbounded();
        let session = Session::new(SessionConfig::default(), collaborators, tx);
        let events = session.bus().subscribe();
        Self {
            session,
            probe,
            rx,
            events,
        }
    }

    /// Queue `ids`, start at index 0 and bring the first track to `Playing`.
    pub(crate) fn playing(ids: &[&str]) -> Self {
        let mut h = Self::new();
        h.send(Command::PlayQueue(queue_request(ids, 0)));
        h.ready();
        assert_eq!(h.state(), PlaybackStateKind::Playing);
        h.events();
        h.probe.clear();
        h
    }

    pub(crate) fn send(&mut self, cmd: Command) {
        self.session.handle(SessionMessage::Command(cmd));
        self.pump();
    }

    pub(crate) fn pump(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.session.handle(msg);
        }
    }

    pub(crate) fn ready(&mut self) {
        self.probe.callbacks().ready();
        self.pump();
    }

    pub(crate) fn complete(&mut self) {
        self.probe.callbacks().completed();
        self.pump();
    }

    pub(crate) fn fail(&mut self, detail: &str) {
        self.probe.callbacks().error(detail);
        self.pump();
    }

    pub(crate) fn seek_complete(&mut self) {
        self.probe.callbacks().seek_complete();
        self.pump();
    }

    pub(crate) fn focus(&mut self, state: FocusState) {
        self.session.handle(SessionMessage::Focus(state));
        self.pump();
    }

    /// Events published since the last call.
    pub(crate) fn events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    pub(crate) fn state(&self) -> PlaybackStateKind {
        self.session.engine().state()
    }
}
