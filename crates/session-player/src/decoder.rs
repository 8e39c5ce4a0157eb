//! Local-file decoder: symphonia decode, optional Rubato resample, cpal output.
//!
//! `load` spawns a decode thread that probes the file, picks the output config, reports
//! `ready` and then keeps the sample queue topped up. Seeks are handed to that thread and
//! acknowledged with `seek_complete`; end of stream is reported once the queue drains.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use session_core::SessionError;
use session_core::decoder::{Decoder, DecoderCallbacks, DecoderFactory};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::buffer::{SampleQueue, calc_max_buffered_samples};
use crate::device;
use crate::output::{OutputControls, OutputHandle};
use crate::resample::StreamResampler;

const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Creates one [`LocalDecoder`] per `play`.
#[derive(Clone, Debug)]
pub struct LocalDecoderFactory {
    device: Option<String>,
    buffer_seconds: f32,
}

impl LocalDecoderFactory {
    pub fn new(device: Option<String>, buffer_seconds: f32) -> Self {
        Self {
            device,
            buffer_seconds,
        }
    }
}

impl DecoderFactory for LocalDecoderFactory {
    fn create(&mut self, callbacks: DecoderCallbacks) -> session_core::Result<Box<dyn Decoder>> {
        Ok(Box::new(LocalDecoder::new(
            self.device.clone(),
            self.buffer_seconds,
            callbacks,
        )))
    }
}

/// What the output stage needs once the source is probed.
#[derive(Clone)]
struct StreamPlan {
    queue: Arc<SampleQueue>,
    config: cpal::SupportedStreamConfig,
}

/// State shared with the decode thread.
#[derive(Default)]
struct DecodeShared {
    cancel: AtomicBool,
    seek_request: Mutex<Option<u64>>,
    /// Position of the last seek; playback offset is this plus played frames.
    base_ms: AtomicU64,
    output_rate: AtomicU32,
    duration_ms: Mutex<Option<u64>>,
    plan: Mutex<Option<StreamPlan>>,
}

impl DecodeShared {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn seek_slot(&self) -> MutexGuard<'_, Option<u64>> {
        self.seek_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn duration(&self) -> Option<u64> {
        self.duration_ms.lock().ok().and_then(|d| *d)
    }

    fn plan(&self) -> Option<StreamPlan> {
        self.plan.lock().ok().and_then(|p| p.clone())
    }
}

enum DecodeEnd {
    Finished,
    Cancelled,
}

pub struct LocalDecoder {
    callbacks: DecoderCallbacks,
    device: Option<String>,
    buffer_seconds: f32,
    shared: Arc<DecodeShared>,
    controls: OutputControls,
    output: Option<OutputHandle>,
    decode_thread: Option<JoinHandle<()>>,
}

impl LocalDecoder {
    fn new(device: Option<String>, buffer_seconds: f32, callbacks: DecoderCallbacks) -> Self {
        Self {
            callbacks,
            device,
            buffer_seconds,
            shared: Arc::new(DecodeShared::default()),
            controls: OutputControls::default(),
            output: None,
            decode_thread: None,
        }
    }
}

impl Decoder for LocalDecoder {
    fn load(&mut self, source: &str) -> session_core::Result<()> {
        let path = source_path(source);
        let device = self.device.clone();
        let buffer_seconds = self.buffer_seconds;
        let shared = self.shared.clone();
        let played = self.controls.played_frames.clone();
        let callbacks = self.callbacks.clone();
        let join = std::thread::Builder::new()
            .name(format!("decode-{}", self.callbacks.generation()))
            .spawn(move || {
                decode_thread_main(path, device, buffer_seconds, shared, played, callbacks)
            })
            .map_err(|err| SessionError::DecoderLoad(format!("spawn decode thread: {err}")))?;
        self.decode_thread = Some(join);
        Ok(())
    }

    fn start(&mut self) -> session_core::Result<()> {
        if self.output.is_none() {
            let plan = self
                .shared
                .plan()
                .ok_or_else(|| SessionError::DecoderRuntime("source not loaded".to_string()))?;
            let output = OutputHandle::spawn(
                self.device.clone(),
                plan.config,
                plan.queue,
                self.controls.clone(),
            )
            .map_err(|err| SessionError::DecoderRuntime(format!("{err:#}")))?;
            self.output = Some(output);
        }
        self.controls.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&mut self) -> session_core::Result<()> {
        self.controls.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> session_core::Result<()> {
        *self.shared.seek_slot() = Some(position_ms);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.controls.set_volume(volume);
    }

    fn position_ms(&self) -> u64 {
        let rate = self.shared.output_rate.load(Ordering::Relaxed) as u64;
        let base = self.shared.base_ms.load(Ordering::Relaxed);
        if rate == 0 {
            return base;
        }
        let played = self.controls.played_frames.load(Ordering::Relaxed);
        let position = base + played.saturating_mul(1000) / rate;
        match self.shared.duration() {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        self.shared.duration()
    }

    fn is_playing(&self) -> bool {
        self.output.is_some() && !self.controls.paused.load(Ordering::Relaxed)
    }

    fn release(&mut self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
        self.controls.paused.store(true, Ordering::Relaxed);
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
        if let Some(join) = self.decode_thread.take() {
            if join.join().is_err() {
                tracing::warn!("decode thread panicked");
            }
        }
    }
}

impl Drop for LocalDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Accept plain paths and `file://` URIs.
pub fn source_path(source: &str) -> PathBuf {
    PathBuf::from(source.strip_prefix("file://").unwrap_or(source))
}

fn decode_thread_main(
    path: PathBuf,
    device: Option<String>,
    buffer_seconds: f32,
    shared: Arc<DecodeShared>,
    played: Arc<AtomicU64>,
    callbacks: DecoderCallbacks,
) {
    match run_decode(&path, device.as_deref(), buffer_seconds, &shared, &played, &callbacks) {
        Ok(DecodeEnd::Finished) => {
            tracing::info!(path = %path.display(), "decode finished");
            callbacks.completed();
        }
        Ok(DecodeEnd::Cancelled) => {
            tracing::debug!(path = %path.display(), "decode cancelled");
        }
        Err(err) => {
            if !shared.cancelled() {
                tracing::warn!(path = %path.display(), "decode failed: {err:#}");
                callbacks.error(format!("{err:#}"));
            }
        }
    }
}

fn run_decode(
    path: &Path,
    device_name: Option<&str>,
    buffer_seconds: f32,
    shared: &DecodeShared,
    played: &AtomicU64,
    callbacks: &DecoderCallbacks,
) -> Result<DecodeEnd> {
    let file = File::open(path).with_context(|| format!("open {path:?}"))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            MediaSourceStream::new(Box::new(file), Default::default()),
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {path:?}"))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let params: CodecParameters = track.codec_params.clone();
    let channels = params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let src_rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let duration = duration_ms_from_codec_params(&params);
    let mut codec = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("create codec")?;

    let host = cpal::default_host();
    let out_device = device::pick_device(&host, device_name)?;
    let config = device::pick_output_config(&out_device, src_rate)?;
    let out_rate = config.sample_rate();
    let mut resampler = StreamResampler::new(src_rate, out_rate, channels)?;
    let queue = Arc::new(SampleQueue::new(
        channels,
        calc_max_buffered_samples(out_rate, channels, buffer_seconds),
    ));

    shared.output_rate.store(out_rate, Ordering::Relaxed);
    if let Ok(mut slot) = shared.duration_ms.lock() {
        *slot = duration;
    }
    if let Ok(mut slot) = shared.plan.lock() {
        *slot = Some(StreamPlan {
            queue: queue.clone(),
            config,
        });
    }
    tracing::info!(
        path = %path.display(),
        src_rate,
        out_rate,
        channels,
        duration_ms = ?duration,
        "source ready"
    );
    callbacks.ready();

    let interrupted = || shared.cancelled() || shared.seek_slot().is_some();
    let mut converted = Vec::new();
    let mut eof = false;
    loop {
        if shared.cancelled() {
            return Ok(DecodeEnd::Cancelled);
        }
        let requested = shared.seek_slot().take();
        if let Some(ms) = requested {
            let target = match duration {
                Some(d) => ms.min(d.saturating_sub(1)),
                None => ms,
            };
            let actual = seek_format(format.as_mut(), &params, track_id, target)?;
            codec.reset();
            if let Some(rs) = resampler.as_mut() {
                rs.reset()?;
            }
            queue.clear();
            played.store(0, Ordering::Relaxed);
            shared.base_ms.store(actual, Ordering::Relaxed);
            eof = false;
            tracing::debug!(requested = ms, actual, "seeked");
            callbacks.seek_complete();
            continue;
        }

        if eof {
            if queue.is_empty() {
                return Ok(DecodeEnd::Finished);
            }
            std::thread::sleep(DRAIN_POLL);
            continue;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => {
                if let Some(rs) = resampler.as_mut() {
                    converted.clear();
                    rs.flush(&mut converted)?;
                    queue.push_interleaved(&converted, interrupted);
                }
                eof = true;
                continue;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match codec.decode(&packet) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::debug!("skipping undecodable packet: {err}");
                continue;
            }
        };
        let mut samples = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        samples.copy_interleaved_ref(decoded);

        match resampler.as_mut() {
            Some(rs) => {
                converted.clear();
                rs.process(samples.samples(), &mut converted)?;
                queue.push_interleaved(&converted, interrupted);
            }
            None => {
                queue.push_interleaved(samples.samples(), interrupted);
            }
        }
    }
}

/// Seek to `ms` and return the position actually reached.
fn seek_format(
    format: &mut dyn FormatReader,
    params: &CodecParameters,
    track_id: u32,
    ms: u64,
) -> Result<u64> {
    let time = Time::new(ms / 1000, (ms % 1000) as f64 / 1000.0);
    let seeked = format
        .seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(track_id),
            },
        )
        .with_context(|| format!("seek to {ms}ms"))?;
    Ok(params
        .time_base
        .map(|tb| {
            let t = tb.calc_time(seeked.actual_ts);
            t.seconds * 1000 + (t.frac * 1000.0) as u64
        })
        .unwrap_or(ms))
}

fn duration_ms_from_codec_params(params: &CodecParameters) -> Option<u64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u64;
    (rate > 0).then(|| frames.saturating_mul(1000) / rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_path_strips_file_scheme() {
        assert_eq!(source_path("file:///music/a.flac"), PathBuf::from("/music/a.flac"));
        assert_eq!(source_path("/music/b.mp3"), PathBuf::from("/music/b.mp3"));
    }

    #[test]
    fn duration_needs_frames_and_rate() {
        let mut params = CodecParameters::new();
        assert_eq!(duration_ms_from_codec_params(&params), None);
        params.with_sample_rate(48_000).with_n_frames(96_000);
        assert_eq!(duration_ms_from_codec_params(&params), Some(2_000));
    }

    #[test]
    fn pending_seek_is_taken_once() {
        let shared = DecodeShared::default();
        *shared.seek_slot() = Some(12_000);
        assert_eq!(shared.seek_slot().take(), Some(12_000));
        assert_eq!(shared.seek_slot().take(), None);
    }

    #[test]
    fn plan_is_absent_until_probed() {
        let shared = DecodeShared::default();
        assert!(shared.plan().is_none());
        assert_eq!(shared.duration(), None);
    }
}
