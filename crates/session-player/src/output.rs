//! Output stage: a cpal stream fed from a [`SampleQueue`].
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream is built and owned by a
//! dedicated thread that lives until [`OutputHandle::stop`] (or drop).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Sender;

use crate::buffer::SampleQueue;
use crate::device;

const REFILL_MAX_FRAMES: usize = 4096;

/// Controls shared between the decoder and the realtime callback.
#[derive(Clone, Debug)]
pub struct OutputControls {
    /// Outputs silence without draining the queue while set.
    pub paused: Arc<AtomicBool>,
    /// Linear gain stored as `f32` bits.
    pub volume: Arc<AtomicU32>,
    /// Frames written to the device since the last reset.
    pub played_frames: Arc<AtomicU64>,
}

impl Default for OutputControls {
    fn default() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(true)),
            volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            played_frames: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl OutputControls {
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }
}

pub struct OutputHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl OutputHandle {
    /// Open the device and start the stream on its own thread.
    ///
    /// Returns once the stream is playing or failed to build.
    pub fn spawn(
        device_name: Option<String>,
        config: cpal::SupportedStreamConfig,
        queue: Arc<SampleQueue>,
        controls: OutputControls,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let join = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), &config, &queue, controls) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("spawn output thread")?;
        ready_rx
            .recv()
            .map_err(|_| anyhow!("output thread exited before reporting"))??;
        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    pub fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    device_name: Option<&str>,
    config: &cpal::SupportedStreamConfig,
    queue: &Arc<SampleQueue>,
    controls: OutputControls,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_name)?;
    let mut stream_config: cpal::StreamConfig = config.config();
    stream_config.buffer_size = device::pick_buffer_size(config);
    tracing::info!(
        device = %device.description()?,
        rate = stream_config.sample_rate,
        channels = stream_config.channels,
        format = ?config.sample_format(),
        "opening output stream"
    );
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, queue, controls),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, queue, controls),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, queue, controls),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, queue, controls),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    stream.play().context("start output stream")?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    controls: OutputControls,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let queue = queue.clone();
    let mut mixer = ChannelMixer::new(queue.channels());

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if controls.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }
            let gain = controls.volume();
            let mut written = 0u64;
            for frame in data.chunks_mut(channels_out) {
                if !mixer.has_frame() && !mixer.refill(&queue) {
                    frame.fill(silence);
                    continue;
                }
                for (ch, out) in frame.iter_mut().enumerate() {
                    *out = <T as cpal::Sample>::from_sample::<f32>(mixer.sample(ch, channels_out) * gain);
                }
                mixer.advance();
                written += 1;
            }
            controls.played_frames.fetch_add(written, Ordering::Relaxed);
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Local buffer drained by the realtime callback, with simple channel mapping.
struct ChannelMixer {
    src_channels: usize,
    src: Vec<f32>,
    pos: usize,
}

impl ChannelMixer {
    fn new(src_channels: usize) -> Self {
        Self {
            src_channels: src_channels.max(1),
            src: Vec::new(),
            pos: 0,
        }
    }

    fn has_frame(&self) -> bool {
        self.pos + self.src_channels <= self.src.len()
    }

    fn refill(&mut self, queue: &SampleQueue) -> bool {
        match queue.pop_frames(REFILL_MAX_FRAMES) {
            Some(samples) => {
                self.src = samples;
                self.pos = 0;
                self.has_frame()
            }
            None => false,
        }
    }

    /// Mono is duplicated, stereo to mono is averaged, anything else clamps to the last
    /// available source channel.
    fn sample(&self, dst_ch: usize, dst_channels: usize) -> f32 {
        let frame = &self.src[self.pos..self.pos + self.src_channels];
        match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (frame[0] + frame[1]),
            (src, _) => frame[dst_ch.min(src - 1)],
        }
    }

    fn advance(&mut self) {
        self.pos += self.src_channels;
    }
}
