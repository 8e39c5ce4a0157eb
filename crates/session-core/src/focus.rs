//! Audio-focus arbitration.
//!
//! [`AudioFocusArbiter`] tracks the last focus state reported by the platform and turns it,
//! together with the engine's current state, into a single [`FocusAction`]. The engine
//! evaluates that action whenever focus changes and whenever it (re)establishes playback
//! after a command.

use crossbeam_channel::Sender;
use session_types::{FocusState, PlaybackStateKind};

use crate::error::SessionError;
use crate::session::SessionMessage;

/// Outcome of a focus request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusRequest {
    Granted,
    Denied,
}

/// `focusChanged` callback handed to the platform with each request.
#[derive(Clone, Debug)]
pub struct FocusNotifier {
    tx: Sender<SessionMessage>,
}

impl FocusNotifier {
    pub(crate) fn new(tx: Sender<SessionMessage>) -> Self {
        Self { tx }
    }

    pub fn changed(&self, state: FocusState) {
        if self.tx.send(SessionMessage::Focus(state)).is_err() {
            tracing::debug!(?state, "focus change after session end");
        }
    }
}

/// Platform audio-focus service.
pub trait AudioFocus: Send {
    fn request(&mut self, notifier: FocusNotifier) -> FocusRequest;
    fn abandon(&mut self);
}

/// What the engine should do for the current focus state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FocusAction {
    Nothing,
    /// Apply `volume`; when `resume` is set, a deferred play should start now.
    SetVolume { volume: f32, resume: bool },
    /// Pause if playing; when `abandon` is set, give focus back as well.
    Pause { abandon: bool },
}

pub struct AudioFocusArbiter {
    focus: Box<dyn AudioFocus>,
    notifier: FocusNotifier,
    state: FocusState,
    play_on_gain: bool,
    /// Outcome of the last platform request when it was refused.
    denial: Option<SessionError>,
    duck_volume: f32,
    normal_volume: f32,
}

impl AudioFocusArbiter {
    pub fn new(
        focus: Box<dyn AudioFocus>,
        notifier: FocusNotifier,
        duck_volume: f32,
        normal_volume: f32,
    ) -> Self {
        Self {
            focus,
            notifier,
            state: FocusState::None,
            play_on_gain: false,
            denial: None,
            duck_volume,
            normal_volume,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// `true` when output may be audible (full or ducked).
    pub fn is_held(&self) -> bool {
        matches!(self.state, FocusState::Gained | FocusState::LostTransientCanDuck)
    }

    /// Set when the last platform request was refused.
    pub fn denial(&self) -> Option<&SessionError> {
        self.denial.as_ref()
    }

    pub fn play_on_gain(&self) -> bool {
        self.play_on_gain
    }

    /// Remember that playback should begin as soon as focus allows it.
    pub fn defer_play(&mut self) {
        self.play_on_gain = true;
    }

    pub fn clear_deferred(&mut self) {
        self.play_on_gain = false;
    }

    /// Ask the platform for focus unless it is already held.
    ///
    /// A refused request is treated as a grant: some platforms never follow up with a
    /// focus callback, and playback must not stall waiting for one.
    pub fn request(&mut self) -> FocusState {
        if self.state == FocusState::Gained {
            return self.state;
        }
        match self.focus.request(self.notifier.clone()) {
            FocusRequest::Granted => {
                tracing::debug!("audio focus granted");
                self.denial = None;
            }
            FocusRequest::Denied => {
                let err = SessionError::FocusDenied;
                tracing::warn!(error = %err, "continuing as if granted");
                self.denial = Some(err);
            }
        }
        self.state = FocusState::Gained;
        self.state
    }

    pub fn abandon(&mut self) {
        if self.state != FocusState::None {
            tracing::debug!(state = ?self.state, "abandoning audio focus");
        }
        self.focus.abandon();
        self.state = FocusState::None;
    }

    /// Record a platform focus change.
    pub fn on_changed(&mut self, state: FocusState, engine_playing: bool) {
        tracing::info!(from = ?self.state, to = ?state, "audio focus changed");
        self.state = state;
        match state {
            FocusState::LostTransient => self.play_on_gain |= engine_playing,
            FocusState::LostPermanently => self.play_on_gain = false,
            _ => {}
        }
    }

    /// Derive the action for `engine_state`. Consumes the deferred-play flag when the
    /// action resumes playback.
    pub fn plan(&mut self, engine_state: PlaybackStateKind) -> FocusAction {
        let playing = engine_state == PlaybackStateKind::Playing;
        match self.state {
            FocusState::Gained => FocusAction::SetVolume {
                volume: self.normal_volume,
                resume: std::mem::take(&mut self.play_on_gain),
            },
            FocusState::LostTransientCanDuck => FocusAction::SetVolume {
                volume: self.duck_volume,
                resume: std::mem::take(&mut self.play_on_gain),
            },
            FocusState::LostPermanently => FocusAction::Pause { abandon: true },
            FocusState::LostTransient | FocusState::None if playing => {
                FocusAction::Pause { abandon: false }
            }
            FocusState::LostTransient | FocusState::None => FocusAction::Nothing,
        }
    }
}
