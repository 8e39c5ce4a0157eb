//! Desktop audio focus.
//!
//! Desktop mixers do not arbitrate output focus, so every request is granted. Focus
//! changes can still be injected through [`crate::runtime`] (`SessionHandle::notify_focus`).

use session_core::focus::{AudioFocus, FocusNotifier, FocusRequest};

#[derive(Debug, Default)]
pub struct DesktopFocus {
    held: bool,
}

impl DesktopFocus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioFocus for DesktopFocus {
    fn request(&mut self, _notifier: FocusNotifier) -> FocusRequest {
        if !self.held {
            tracing::debug!("audio focus acquired");
        }
        self.held = true;
        FocusRequest::Granted
    }

    fn abandon(&mut self) {
        if self.held {
            tracing::debug!("audio focus released");
        }
        self.held = false;
    }
}
