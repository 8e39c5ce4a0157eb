use thiserror::Error;

/// Failures a session can observe.
///
/// Queue lookups are recovered locally and decoder failures are reported to listeners;
/// none of these abort the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("queue index {index} out of bounds (len {len})")]
    InvalidQueueIndex { index: i64, len: usize },

    #[error("track not found in queue: {0}")]
    TrackNotFound(String),

    #[error("decoder load failed: {0}")]
    DecoderLoad(String),

    #[error("decoder error: {0}")]
    DecoderRuntime(String),

    #[error("audio focus request denied")]
    FocusDenied,

    #[error("session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
