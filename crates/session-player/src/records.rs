//! JSON-file position records keyed by track id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use session_core::sinks::SaveRecordSink;
use session_types::Track;

pub struct JsonRecordStore {
    path: PathBuf,
    positions: Mutex<BTreeMap<String, u64>>,
}

impl JsonRecordStore {
    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let positions = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("read records {:?}", path))?;
            serde_json::from_str::<BTreeMap<String, u64>>(&raw)
                .with_context(|| format!("parse records {:?}", path))?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), entries = positions.len(), "records loaded");
        Ok(Self {
            path,
            positions: Mutex::new(positions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved position for `track_id`, if any.
    pub fn position_for(&self, track_id: &str) -> Option<u64> {
        self.positions
            .lock()
            .ok()
            .and_then(|positions| positions.get(track_id).copied())
    }

    fn record(&self, track_id: &str, position_ms: u64) -> Result<()> {
        let json = {
            let mut positions = self
                .positions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            positions.insert(track_id.to_string(), position_ms);
            serde_json::to_string_pretty(&*positions).context("encode records")?
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create records dir {:?}", parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write records {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace records {:?}", self.path))?;
        Ok(())
    }
}

impl SaveRecordSink for JsonRecordStore {
    fn on_save_record(&self, track: &Track, position_ms: u64) {
        match self.record(&track.id, position_ms) {
            Ok(()) => tracing::debug!(track_id = %track.id, position_ms, "position saved"),
            Err(err) => tracing::warn!(track_id = %track.id, "save position failed: {err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!(
                "session-player-records-{tag}-{}",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_nanos()
            ))
            .join("positions.json")
    }

    #[test]
    fn missing_file_opens_empty() {
        let store = JsonRecordStore::open(temp_file("empty")).unwrap();
        assert_eq!(store.position_for("a"), None);
    }

    #[test]
    fn saved_positions_survive_reopen() {
        let path = temp_file("reopen");
        let store = JsonRecordStore::open(&path).unwrap();
        store.on_save_record(&Track::new("a", "/music/a.flac"), 1_000);
        store.on_save_record(&Track::new("a", "/music/a.flac"), 42_000);
        store.on_save_record(&Track::new("b", "/music/b.flac"), 7);
        assert_eq!(store.position_for("a"), Some(42_000));

        let reopened = JsonRecordStore::open(&path).unwrap();
        assert_eq!(reopened.position_for("a"), Some(42_000));
        assert_eq!(reopened.position_for("b"), Some(7));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_file("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonRecordStore::open(&path).err().unwrap();
        assert!(format!("{err:#}").contains("parse records"));
    }
}
