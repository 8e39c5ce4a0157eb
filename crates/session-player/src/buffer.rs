//! Bounded sample queue between the decode thread and the output callback.
//!
//! Samples are interleaved `f32` at the output device rate. The producer blocks while the
//! queue is full but can be interrupted (seek, release); the output callback only ever
//! pops without blocking.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

const PUSH_POLL: Duration = Duration::from_millis(20);

/// Queue capacity in samples for `seconds` of audio.
///
/// Non-finite or non-positive `seconds` fall back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

pub struct SampleQueue {
    channels: usize,
    max_samples: usize,
    samples: Mutex<VecDeque<f32>>,
    cv: Condvar,
}

impl SampleQueue {
    pub fn new(channels: usize, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            max_samples: max_samples.max(channels),
            samples: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len_samples(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Push `samples`, waiting for room while the queue is full.
    ///
    /// `interrupted` is polled while waiting; once it returns `true` the rest of `samples`
    /// is dropped and `false` is returned.
    pub fn push_interleaved(&self, samples: &[f32], interrupted: impl Fn() -> bool) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut queue = self.lock();
            while queue.len() >= self.max_samples {
                if interrupted() {
                    return false;
                }
                queue = match self.cv.wait_timeout(queue, PUSH_POLL) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
            let room = self.max_samples - queue.len();
            let take = room.min(samples.len() - offset);
            queue.extend(&samples[offset..offset + take]);
            offset += take;
        }
        true
    }

    /// Pop up to `max_frames` whole frames without blocking.
    pub fn pop_frames(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut queue = self.lock();
        let frames = (queue.len() / self.channels).min(max_frames);
        if frames == 0 {
            return None;
        }
        let out: Vec<f32> = queue.drain(..frames * self.channels).collect();
        drop(queue);
        self.cv.notify_all();
        Some(out)
    }

    /// Drop everything buffered (after a seek).
    pub fn clear(&self) {
        self.lock().clear();
        self.cv.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
