//! Output device discovery and stream-config selection (cpal).

use std::cmp::Reverse;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Largest fixed buffer requested from devices that advertise a range.
const MAX_BUFFER_FRAMES: u32 = 16_384;

/// First output device whose name contains `needle` (case-insensitive), or the default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle.filter(|n| !n.trim().is_empty()) else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };
    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Best output config for a source at `source_rate`.
///
/// Preference order: a rate that does not exceed the source (exact match wins), then the
/// highest such rate, then float over integer sample formats.
pub fn pick_output_config(
    device: &cpal::Device,
    source_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    device
        .supported_output_configs()
        .context("query output configs")?
        .map(|range| {
            let rate = source_rate.clamp(range.min_sample_rate(), range.max_sample_rate());
            let format = range.sample_format();
            let key = (rate <= source_rate, rate, Reverse(sample_format_rank(format)));
            (key, range.with_sample_rate(rate))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Fixed buffer size when the device reports a range, capped to keep latency sane.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> cpal::BufferSize {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            cpal::BufferSize::Fixed((*max).min(MAX_BUFFER_FRAMES).max(*min))
        }
        cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
    }
}

/// Print output devices for `devices` subcommand.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());
    for (i, device) in host
        .output_devices()
        .context("No output devices")?
        .enumerate()
    {
        let name = device.description()?.name().to_string();
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("#{i}: {name}{marker}");
    }
    Ok(())
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
