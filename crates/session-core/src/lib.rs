//! Playback session engine.
//!
//! A [`session::Session`] owns the track queue, one [`engine::PlaybackEngine`] and the
//! listener set. Client commands, decoder callbacks and audio-focus changes all enter
//! through one [`session::SessionMessage`] stream so exactly one of them is processed
//! at a time. [`runtime::spawn_session`] runs that stream on a dedicated worker thread.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod focus;
pub mod queue;
pub mod runtime;
pub mod session;
pub mod sinks;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use runtime::{SessionHandle, spawn_session};
pub use session::{Collaborators, Session, SessionMessage};
pub use session_types as types;
