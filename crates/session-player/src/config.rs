//! Player configuration file (TOML).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use session_core::SessionConfig;

const DEFAULT_BUFFER_SECONDS: f32 = 2.0;
const DEFAULT_RECORD_FILE: &str = "session-positions.json";

#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct PlayerConfig {
    /// Output device substring match.
    pub device: Option<String>,
    pub buffer_seconds: Option<f32>,
    /// Where per-track resume positions are kept.
    pub record_path: Option<PathBuf>,
    pub queue_title: Option<String>,
    pub duck_volume: Option<f32>,
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlayerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    pub fn buffer_seconds(&self) -> f32 {
        self.buffer_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_BUFFER_SECONDS)
    }

    pub fn record_path(&self) -> PathBuf {
        self.record_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_RECORD_FILE))
    }

    /// Core session settings derived from this file.
    pub fn session_config(&self) -> SessionConfig {
        let mut cfg = SessionConfig::default();
        if let Some(duck) = self.duck_volume {
            cfg.duck_volume = duck;
        }
        if let Some(title) = self.queue_title.as_ref() {
            cfg.default_queue_title = title.clone();
        }
        cfg.normalized()
    }
}
