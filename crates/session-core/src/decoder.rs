//! Decoder collaborator contract.
//!
//! The engine asks a [`DecoderFactory`] for a fresh [`Decoder`] on every `play`. Load and
//! seek complete asynchronously: the decoder reports back through the [`DecoderCallbacks`]
//! it was created with, and every report is tagged with that decoder's generation so the
//! session can drop callbacks from decoders it already released.

use crossbeam_channel::Sender;

use crate::error::Result;
use crate::session::SessionMessage;

/// Asynchronous decoder outcomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderEvent {
    /// `load` finished; the decoder can start.
    Ready,
    /// End of stream reached while playing.
    Completed,
    Error(String),
    SeekComplete,
}

/// Re-entry point for one decoder's callbacks.
#[derive(Clone, Debug)]
pub struct DecoderCallbacks {
    generation: u64,
    tx: Sender<SessionMessage>,
}

impl DecoderCallbacks {
    pub(crate) fn new(generation: u64, tx: Sender<SessionMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ready(&self) {
        self.emit(DecoderEvent::Ready);
    }

    pub fn completed(&self) {
        self.emit(DecoderEvent::Completed);
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.emit(DecoderEvent::Error(detail.into()));
    }

    pub fn seek_complete(&self) {
        self.emit(DecoderEvent::SeekComplete);
    }

    fn emit(&self, event: DecoderEvent) {
        // The session is gone once its receiver drops; nothing left to notify.
        if self
            .tx
            .send(SessionMessage::Decoder {
                generation: self.generation,
                event,
            })
            .is_err()
        {
            tracing::debug!(generation = self.generation, "decoder callback after session end");
        }
    }
}

/// One loaded (or loading) audio source.
pub trait Decoder: Send {
    /// Begin loading `source`. Completion is reported via `ready` or `error`.
    fn load(&mut self, source: &str) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    /// Reposition playback; completion is reported via `seek_complete`.
    fn seek_to(&mut self, position_ms: u64) -> Result<()>;
    fn set_volume(&mut self, volume: f32);
    fn position_ms(&self) -> u64;
    /// Total length once known.
    fn duration_ms(&self) -> Option<u64>;
    fn is_playing(&self) -> bool;
    /// Stop output and free device/decoder resources. No callbacks follow.
    fn release(&mut self);
}

/// Creates decoders bound to a callback generation.
pub trait DecoderFactory: Send {
    fn create(&mut self, callbacks: DecoderCallbacks) -> Result<Box<dyn Decoder>>;
}

/// Lock that keeps the network/radio awake while streaming.
pub trait KeepAliveLock: Send {
    fn acquire(&mut self);
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Keep-alive lock for hosts that have nothing to hold awake.
#[derive(Debug, Default)]
pub struct NoopKeepAlive {
    held: bool,
}

impl KeepAliveLock for NoopKeepAlive {
    fn acquire(&mut self) {
        self.held = true;
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_tag_events_with_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cb = DecoderCallbacks::new(7, tx);
        cb.ready();
        cb.error("boom");
        match rx.try_recv() {
            Ok(SessionMessage::Decoder { generation, event }) => {
                assert_eq!(generation, 7);
                assert_eq!(event, DecoderEvent::Ready);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionMessage::Decoder { event: DecoderEvent::Error(ref d), .. }) if d == "boom"
        ));
    }

    #[test]
    fn callbacks_survive_closed_session() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        DecoderCallbacks::new(1, tx).completed();
    }

    #[test]
    fn noop_keep_alive_tracks_hold_state() {
        let mut lock = NoopKeepAlive::default();
        assert!(!lock.is_held());
        lock.acquire();
        assert!(lock.is_held());
        lock.release();
        assert!(!lock.is_held());
    }
}
