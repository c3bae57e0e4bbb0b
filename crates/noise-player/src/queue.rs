//! Lock-free sample ring between the session thread and the output callback.
//!
//! Single producer, single consumer. The producer only ever pushes whole frames,
//! so the consumer can rely on frame alignment.

use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Ring capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive durations fall back to half a second.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        0.5
    };
    let frames = ((rate_hz as f32 * secs).ceil() as usize).max(1);
    frames.saturating_mul(channels.max(1))
}

/// Producer half; see [`sample_ring`].
pub struct RingWriter {
    inner: HeapProd<f32>,
    channels: usize,
}

/// Allocate a ring of `capacity_samples` (rounded up to whole frames).
pub fn sample_ring(capacity_samples: usize, channels: usize) -> (RingWriter, HeapCons<f32>) {
    let channels = channels.max(1);
    let frames = capacity_samples.div_ceil(channels).max(1);
    let (prod, cons) = HeapRb::<f32>::new(frames * channels).split();
    (
        RingWriter {
            inner: prod,
            channels,
        },
        cons,
    )
}

impl RingWriter {
    /// Push as many whole frames of `interleaved` as fit; returns samples pushed.
    ///
    /// Both sides move whole frames, so free space is always a multiple of the
    /// channel count and a partial push still ends on a frame boundary.
    pub fn push_frames(&mut self, interleaved: &[f32]) -> usize {
        let usable = interleaved.len() - interleaved.len() % self.channels;
        self.inner.push_slice(&interleaved[..usable])
    }
}
