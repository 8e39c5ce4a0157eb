/// Tuning knobs for a playback session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Output volume while another app holds shareable ("duckable") focus.
    pub duck_volume: f32,
    /// Output volume while focus is held.
    pub normal_volume: f32,
    /// Queue title used when a client omits one.
    pub default_queue_title: String,
    /// Restart a source from its last recorded offset when it is played again.
    pub resume_same_source: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duck_volume: 0.2,
            normal_volume: 1.0,
            default_queue_title: "new queue".to_string(),
            resume_same_source: true,
        }
    }
}

impl SessionConfig {
    /// Clamp volumes into `0.0..=1.0`, falling back to defaults for non-finite input.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.duck_volume = clamp_volume(self.duck_volume, defaults.duck_volume);
        self.normal_volume = clamp_volume(self.normal_volume, defaults.normal_volume);
        if self.default_queue_title.trim().is_empty() {
            self.default_queue_title = defaults.default_queue_title;
        }
        self
    }
}

fn clamp_volume(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}
