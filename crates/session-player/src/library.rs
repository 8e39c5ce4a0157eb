//! Build [`Track`]s from local files.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use session_types::Track;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;

const SUPPORTED_EXTENSIONS: [&str; 6] = ["flac", "mp3", "wav", "aac", "aif", "aiff"];

pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Expand directories (one level, sorted) into supported audio files.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("read dir {path:?}"))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_supported_extension(p))
                .collect();
            entries.sort();
            out.extend(entries);
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_supported_extension)
}

/// Probe `path` for tags and duration. Unreadable tags leave fields empty.
///
/// The canonical path doubles as the track id and the decoder source.
pub fn track_from_path(path: &Path) -> Result<Track> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("resolve {path:?}"))?;
    let id = canonical.to_string_lossy().to_string();
    let mut track = Track::new(id.clone(), id);
    track.title = canonical
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string());
    apply_probed_meta(&canonical, &mut track);
    Ok(track)
}

fn apply_probed_meta(path: &Path, track: &mut Track) {
    let Ok(file) = File::open(path) else {
        return;
    };
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(probed) => probed,
        Err(err) => {
            tracing::debug!(path = %path.display(), "probe failed: {err}");
            return;
        }
    };

    if let Some(default_track) = probed.format.default_track() {
        let params = &default_track.codec_params;
        if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
            if rate > 0 {
                track.duration_ms = Some(frames.saturating_mul(1000) / rate as u64);
            }
        }
    }

    if let Some(rev) = probed.format.metadata().current() {
        let mut title = None;
        for tag in rev.tags() {
            let slot = match tag.std_key {
                Some(StandardTagKey::TrackTitle) => &mut title,
                Some(StandardTagKey::Artist) => &mut track.artist,
                Some(StandardTagKey::Album) => &mut track.album,
                Some(StandardTagKey::Genre) => &mut track.genre,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(tag.value.to_string());
            }
        }
        if title.is_some() {
            track.title = title;
        }
    }
}
