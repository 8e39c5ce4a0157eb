use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use session_core::decoder::{Decoder, DecoderCallbacks, DecoderFactory};
use session_core::events::SessionListener;
use session_core::focus::{AudioFocus, FocusNotifier, FocusRequest};
use session_core::runtime::spawn_session;
use session_core::session::Collaborators;
use session_core::types::{
    Command, FocusState, PlaybackStateKind, QueueRequest, SessionEvent, Track,
};
use session_core::{SessionConfig, SessionError};

/// Decoder that is ready as soon as it is loaded.
struct InstantDecoder {
    callbacks: DecoderCallbacks,
    playing: Arc<AtomicBool>,
}

impl Decoder for InstantDecoder {
    fn load(&mut self, _source: &str) -> session_core::Result<()> {
        self.callbacks.ready();
        Ok(())
    }

    fn start(&mut self) -> session_core::Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> session_core::Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn seek_to(&mut self, _position_ms: u64) -> session_core::Result<()> {
        self.callbacks.seek_complete();
        Ok(())
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn position_ms(&self) -> u64 {
        0
    }

    fn duration_ms(&self) -> Option<u64> {
        None
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn release(&mut self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

#[derive(Default, Clone)]
struct InstantFactory {
    created: Arc<Mutex<Vec<DecoderCallbacks>>>,
}

impl DecoderFactory for InstantFactory {
    fn create(&mut self, callbacks: DecoderCallbacks) -> session_core::Result<Box<dyn Decoder>> {
        self.created.lock().unwrap().push(callbacks.clone());
        Ok(Box::new(InstantDecoder {
            callbacks,
            playing: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[derive(Default, Clone)]
struct DesktopFocus {
    notifier: Arc<Mutex<Option<FocusNotifier>>>,
}

impl AudioFocus for DesktopFocus {
    fn request(&mut self, notifier: FocusNotifier) -> FocusRequest {
        *self.notifier.lock().unwrap() = Some(notifier);
        FocusRequest::Granted
    }

    fn abandon(&mut self) {}
}

#[derive(Default)]
struct CountingListener(AtomicUsize);

impl SessionListener for CountingListener {
    fn on_event(&self, _event: &SessionEvent) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn queue(ids: &[&str]) -> QueueRequest {
    QueueRequest {
        title: Some("runtime".to_string()),
        tracks: ids
            .iter()
            .map(|id| Track::new(*id, format!("mem://{id}")))
            .collect(),
        index: 0,
    }
}

fn wait_for(rx: &Receiver<SessionEvent>, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(err) => panic!("event not observed: {err}"),
        }
    }
}

fn is_state(event: &SessionEvent, state: PlaybackStateKind) -> bool {
    matches!(event, SessionEvent::PlaybackStateChanged(s) if s.state == state)
}

#[test]
fn play_queue_reaches_playing_and_advances_on_completion() {
    let factory = InstantFactory::default();
    let handle = spawn_session(
        SessionConfig::default(),
        Collaborators::new(Box::new(factory.clone()), Box::new(DesktopFocus::default())),
    )
    .unwrap();
    let events = handle.subscribe();

    handle.send(Command::PlayQueue(queue(&["a", "b"]))).unwrap();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));
    assert_eq!(handle.snapshot().active_track_id.as_deref(), Some("a"));

    let first = factory.created.lock().unwrap()[0].clone();
    first.completed();
    wait_for(&events, |e| {
        matches!(e, SessionEvent::MetadataChanged { track } if track.id == "b")
    });
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));
    assert_eq!(handle.snapshot().active_track_id.as_deref(), Some("b"));

    handle.shutdown();
}

#[test]
fn focus_changes_reenter_the_session() {
    let focus = DesktopFocus::default();
    let handle = spawn_session(
        SessionConfig::default(),
        Collaborators::new(Box::new(InstantFactory::default()), Box::new(focus.clone())),
    )
    .unwrap();
    let events = handle.subscribe();
    handle.send(Command::PlayQueue(queue(&["a"]))).unwrap();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));

    let notifier = focus.notifier.lock().unwrap().clone().unwrap();
    notifier.changed(FocusState::LostTransient);
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Paused));
    notifier.changed(FocusState::Gained);
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));

    handle.shutdown();
}

#[test]
fn listeners_observe_events_until_removed() {
    let handle = spawn_session(
        SessionConfig::default(),
        Collaborators::new(
            Box::new(InstantFactory::default()),
            Box::new(DesktopFocus::default()),
        ),
    )
    .unwrap();
    let counter = Arc::new(CountingListener::default());
    let listener: Arc<dyn SessionListener> = counter.clone();
    let id = handle.add_listener(&listener);
    let events = handle.subscribe();

    handle.send(Command::PlayQueue(queue(&["a"]))).unwrap();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));
    assert!(counter.0.load(Ordering::SeqCst) > 0);

    assert!(handle.remove_listener(id));
    let seen = counter.0.load(Ordering::SeqCst);
    handle.send(Command::Pause).unwrap();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Paused));
    assert_eq!(counter.0.load(Ordering::SeqCst), seen);

    handle.shutdown();
}

#[test]
fn shutdown_stops_playback_and_closes_the_handle() {
    let handle = spawn_session(
        SessionConfig::default(),
        Collaborators::new(
            Box::new(InstantFactory::default()),
            Box::new(DesktopFocus::default()),
        ),
    )
    .unwrap();
    let events = handle.subscribe();
    handle.send(Command::PlayQueue(queue(&["a"]))).unwrap();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Playing));

    handle.shutdown();
    wait_for(&events, |e| is_state(e, PlaybackStateKind::Stopped));
    assert_eq!(handle.snapshot().state, PlaybackStateKind::Stopped);
    assert_eq!(handle.send(Command::Play), Err(SessionError::Closed));
}
