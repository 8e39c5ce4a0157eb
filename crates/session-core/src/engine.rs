//! Playback state machine around one decoder instance.
//!
//! Owns the current [`Decoder`], the [`AudioFocusArbiter`] and the keep-alive lock, and
//! turns commands plus asynchronous decoder/focus callbacks into a
//! [`PlaybackStateKind`]. Everything observable is queued as an [`EngineEvent`] and
//! drained by the session after each message.

use crossbeam_channel::Sender;
use session_types::{FocusState, PlaybackStateKind};

use crate::config::SessionConfig;
use crate::decoder::{Decoder, DecoderCallbacks, DecoderEvent, DecoderFactory, KeepAliveLock};
use crate::focus::{AudioFocus, AudioFocusArbiter, FocusAction, FocusNotifier};
use crate::session::SessionMessage;

const NO_SOURCE: &str = "no media loaded";

/// Engine outputs consumed by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    StatusChanged(PlaybackStateKind),
    /// The current source played to its end.
    Completion,
    Error(String),
}

pub struct PlaybackEngine {
    factory: Box<dyn DecoderFactory>,
    decoder: Option<Box<dyn Decoder>>,
    /// Bumped per created decoder; callbacks carrying an older value are stale.
    generation: u64,
    focus: AudioFocusArbiter,
    keep_alive: Box<dyn KeepAliveLock>,
    tx: Sender<SessionMessage>,
    state: PlaybackStateKind,
    error: Option<String>,
    position_ms: u64,
    source: Option<String>,
    /// Last offset reached per source, reused when that source is played again.
    resume: Option<(String, u64)>,
    prepared: bool,
    seek_pending: bool,
    speed: f32,
    resume_same_source: bool,
    events: Vec<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(
        config: &SessionConfig,
        factory: Box<dyn DecoderFactory>,
        focus: Box<dyn AudioFocus>,
        keep_alive: Box<dyn KeepAliveLock>,
        tx: Sender<SessionMessage>,
    ) -> Self {
        let focus = AudioFocusArbiter::new(
            focus,
            FocusNotifier::new(tx.clone()),
            config.duck_volume,
            config.normal_volume,
        );
        Self {
            factory,
            decoder: None,
            generation: 0,
            focus,
            keep_alive,
            tx,
            state: PlaybackStateKind::None,
            error: None,
            position_ms: 0,
            source: None,
            resume: None,
            prepared: false,
            seek_pending: false,
            speed: 1.0,
            resume_same_source: config.resume_same_source,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackStateKind {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn focus_state(&self) -> FocusState {
        self.focus.state()
    }

    pub fn keep_alive_held(&self) -> bool {
        self.keep_alive.is_held()
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Playing, or about to start once load/focus allows.
    pub fn is_playing(&self) -> bool {
        self.focus.play_on_gain() || self.decoder.as_ref().is_some_and(|d| d.is_playing())
    }

    pub fn position_ms(&self) -> u64 {
        match self.decoder.as_ref() {
            Some(d) if self.prepared && !self.seek_pending => d.position_ms(),
            _ => self.position_ms,
        }
    }

    /// Drain events produced since the last call.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Load `source` into a fresh decoder and start it once ready.
    pub fn play(&mut self, source: &str) {
        tracing::info!(source, "play");
        self.focus.defer_play();
        self.position_ms = match &self.resume {
            Some((last, pos)) if self.resume_same_source && last == source => *pos,
            _ => 0,
        };
        self.release_decoder();
        self.error = None;
        self.source = Some(source.to_string());
        self.focus.request();

        self.generation += 1;
        let callbacks = DecoderCallbacks::new(self.generation, self.tx.clone());
        let mut decoder = match self.factory.create(callbacks) {
            Ok(decoder) => decoder,
            Err(err) => {
                self.fail(err.to_string());
                return;
            }
        };
        self.state = PlaybackStateKind::Buffering;
        if let Err(err) = decoder.load(source) {
            decoder.release();
            self.fail(err.to_string());
            return;
        }
        self.decoder = Some(decoder);
        self.keep_alive.acquire();
        self.notify();
    }

    /// Resume the loaded source.
    pub fn start(&mut self) {
        if self.decoder.is_none() {
            self.state = PlaybackStateKind::Error;
            self.error = Some(NO_SOURCE.to_string());
            self.notify();
            return;
        }
        if self.state == PlaybackStateKind::Error {
            self.notify();
            return;
        }
        self.focus.defer_play();
        self.focus.request();
        self.apply_focus();
        self.notify();
    }

    pub fn pause(&mut self) {
        if self.decoder.is_none() {
            self.state = PlaybackStateKind::None;
            self.notify();
            return;
        }
        if self.state == PlaybackStateKind::Error {
            self.notify();
            return;
        }
        self.focus.clear_deferred();
        self.pause_decoder();
        self.notify();
    }

    /// Release the decoder and every held resource.
    pub fn stop(&mut self, notify: bool) {
        if self.decoder.is_some() {
            let position = self.position_ms();
            self.position_ms = position;
            self.remember_position(position);
            tracing::info!(position_ms = position, "stop");
        }
        self.state = PlaybackStateKind::Stopped;
        self.error = None;
        self.release_decoder();
        self.focus.clear_deferred();
        self.focus.abandon();
        self.keep_alive.release();
        if notify {
            self.notify();
        }
    }

    pub fn seek_to(&mut self, position_ms: u64) {
        if self.state == PlaybackStateKind::Error {
            self.notify();
            return;
        }
        self.position_ms = position_ms;
        let Some(decoder) = self.decoder.as_mut() else {
            if let Some(source) = self.source.clone() {
                self.resume = Some((source, position_ms));
            }
            self.notify();
            return;
        };
        if !self.prepared {
            // Applied once the load completes.
            return;
        }
        if let Err(err) = decoder.seek_to(position_ms) {
            self.fail(err.to_string());
            return;
        }
        self.seek_pending = true;
        if self.state == PlaybackStateKind::Playing {
            self.state = PlaybackStateKind::Buffering;
        }
        self.notify();
    }

    pub fn on_focus_changed(&mut self, state: FocusState) {
        let playing = self.state == PlaybackStateKind::Playing;
        self.focus.on_changed(state, playing);
        if self.decoder.is_none() {
            return;
        }
        self.apply_focus();
        self.notify();
    }

    pub fn on_decoder_event(&mut self, generation: u64, event: DecoderEvent) {
        if generation != self.generation || self.decoder.is_none() {
            tracing::debug!(generation, current = self.generation, ?event, "stale decoder callback");
            return;
        }
        match event {
            DecoderEvent::Ready => self.on_ready(),
            DecoderEvent::Completed => {
                tracing::info!(source = self.source.as_deref().unwrap_or(""), "playback completed");
                self.source = None;
                self.resume = None;
                self.events.push(EngineEvent::Completion);
            }
            DecoderEvent::Error(detail) => self.fail(detail),
            DecoderEvent::SeekComplete => self.on_seek_complete(),
        }
    }

    fn on_ready(&mut self) {
        self.prepared = true;
        if let Some(duration) = self.decoder.as_ref().and_then(|d| d.duration_ms()) {
            self.position_ms = self.position_ms.min(duration);
        }
        tracing::debug!(position_ms = self.position_ms, "decoder ready");
        self.apply_focus();
        if self.state == PlaybackStateKind::Buffering && !self.seek_pending {
            // Focus not available yet; playback starts on the next gain.
            self.state = PlaybackStateKind::Paused;
            self.keep_alive.release();
        }
        self.notify();
    }

    fn on_seek_complete(&mut self) {
        self.seek_pending = false;
        if let Some(decoder) = self.decoder.as_ref() {
            self.position_ms = decoder.position_ms();
        }
        tracing::debug!(position_ms = self.position_ms, "seek complete");
        if self.state == PlaybackStateKind::Buffering {
            self.start_decoder();
        }
        self.notify();
    }

    fn apply_focus(&mut self) {
        match self.focus.plan(self.state) {
            FocusAction::SetVolume { volume, resume } => {
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.set_volume(volume);
                }
                if resume {
                    self.resume_decoder();
                }
            }
            FocusAction::Pause { abandon } => {
                if self.state == PlaybackStateKind::Playing {
                    self.pause_decoder();
                }
                if abandon {
                    self.focus.abandon();
                    self.keep_alive.release();
                }
            }
            FocusAction::Nothing => {}
        }
    }

    fn resume_decoder(&mut self) {
        if !self.prepared {
            self.focus.defer_play();
            return;
        }
        if self.seek_pending {
            // Started by `on_seek_complete`.
            self.state = PlaybackStateKind::Buffering;
            self.keep_alive.acquire();
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        if decoder.is_playing() {
            self.state = PlaybackStateKind::Playing;
            return;
        }
        if self.position_ms == decoder.position_ms() {
            self.start_decoder();
            return;
        }
        if let Err(err) = decoder.seek_to(self.position_ms) {
            self.fail(err.to_string());
            return;
        }
        self.seek_pending = true;
        self.state = PlaybackStateKind::Buffering;
        self.keep_alive.acquire();
    }

    fn start_decoder(&mut self) {
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        if let Err(err) = decoder.start() {
            self.fail(err.to_string());
            return;
        }
        self.state = PlaybackStateKind::Playing;
        self.keep_alive.acquire();
    }

    fn pause_decoder(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            if decoder.is_playing() {
                if let Err(err) = decoder.pause() {
                    tracing::warn!("decoder pause failed: {err}");
                }
            }
        }
        self.position_ms = self.position_ms();
        self.keep_alive.release();
        self.state = PlaybackStateKind::Paused;
    }

    fn fail(&mut self, detail: String) {
        tracing::warn!(error = %detail, "playback error");
        let position = self.position_ms();
        self.position_ms = position;
        self.remember_position(position);
        self.state = PlaybackStateKind::Error;
        self.error = Some(detail.clone());
        self.seek_pending = false;
        self.focus.clear_deferred();
        self.keep_alive.release();
        self.events.push(EngineEvent::Error(detail));
    }

    fn remember_position(&mut self, position_ms: u64) {
        if let Some(source) = self.source.clone() {
            self.resume = Some((source, position_ms));
        }
    }

    fn release_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
        }
        self.prepared = false;
        self.seek_pending = false;
    }

    fn notify(&mut self) {
        self.events.push(EngineEvent::StatusChanged(self.state));
    }
}
