//! Sample-rate conversion between the decoded source and the output device.
//!
//! Wraps Rubato's asynchronous sinc resampler with fixed-size input chunks. Decoded
//! audio is accumulated until a full chunk is available; [`StreamResampler::flush`]
//! converts whatever is left at end of stream.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

const CHUNK_FRAMES: usize = 1024;

pub struct StreamResampler {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    ratio: f64,
    pending: Vec<f32>,
    out: Vec<f32>,
}

impl StreamResampler {
    /// `None` when no conversion is needed.
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Result<Option<Self>> {
        if src_rate == dst_rate || src_rate == 0 || channels == 0 {
            return Ok(None);
        }
        let ratio = dst_rate as f64 / src_rate as f64;
        let resampler = build_resampler(ratio, channels)?;
        let out_frames = (CHUNK_FRAMES as f64 * ratio * 1.2).ceil() as usize + 64;
        tracing::info!(src_rate, dst_rate, channels, "resampling enabled");
        Ok(Some(Self {
            resampler,
            channels,
            ratio,
            pending: Vec::with_capacity(CHUNK_FRAMES * channels * 2),
            out: vec![0.0; out_frames * channels],
        }))
    }

    /// Feed decoded samples; converted output for every completed chunk goes to `sink`.
    pub fn process(&mut self, samples: &[f32], sink: &mut Vec<f32>) -> Result<()> {
        self.pending.extend_from_slice(samples);
        let chunk = CHUNK_FRAMES * self.channels;
        while self.pending.len() >= chunk {
            let input: Vec<f32> = self.pending.drain(..chunk).collect();
            self.run(&input, CHUNK_FRAMES, None, sink)?;
        }
        Ok(())
    }

    /// Convert the partial chunk left at end of stream.
    pub fn flush(&mut self, sink: &mut Vec<f32>) -> Result<()> {
        let frames = self.pending.len() / self.channels;
        if frames == 0 {
            self.pending.clear();
            return Ok(());
        }
        let mut input = std::mem::take(&mut self.pending);
        input.truncate(frames * self.channels);
        input.resize(CHUNK_FRAMES * self.channels, 0.0);
        self.run(&input, CHUNK_FRAMES, Some(frames), sink)
    }

    /// Drop buffered input and filter state (after a seek).
    pub fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.resampler = build_resampler(self.ratio, self.channels)?;
        Ok(())
    }

    fn run(
        &mut self,
        input: &[f32],
        frames: usize,
        partial_len: Option<usize>,
        sink: &mut Vec<f32>,
    ) -> Result<()> {
        let input_adapter = InterleavedSlice::new(input, self.channels, frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let out_frames = self.out.len() / self.channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, self.channels, out_frames)
            .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };
        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;
        sink.extend_from_slice(&self.out[..produced * self.channels]);
        Ok(())
    }
}

fn build_resampler(ratio: f64, channels: usize) -> Result<Box<dyn Resampler<f32>>> {
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let resampler = Async::<f32>::new_sinc(
        ratio,
        1.1,
        &params,
        CHUNK_FRAMES,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init: {e}"))?;
    Ok(Box::new(resampler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rates_need_no_resampler() {
        assert!(StreamResampler::new(48_000, 48_000, 2).unwrap().is_none());
    }

    #[test]
    fn output_length_tracks_rate_ratio() {
        let mut rs = StreamResampler::new(44_100, 88_200, 1).unwrap().unwrap();
        let mut out = Vec::new();
        rs.process(&vec![0.25; CHUNK_FRAMES * 8], &mut out).unwrap();
        rs.flush(&mut out).unwrap();
        let expected = CHUNK_FRAMES * 16;
        assert!(out.len() > expected / 2, "produced {}", out.len());
        assert!(out.len() < expected * 2, "produced {}", out.len());
    }
}
