//! Playback stage (output callback).
//!
//! [`BlockRenderer`] is everything the real-time callback touches:
//! - the consumer half of the sample ring
//! - a scratch buffer allocated up front
//! - the session's stop signal and atomic counters
//!
//! Per callback it pops whatever the ring holds without locking, applies channel
//! mapping (mono↔stereo, best-effort otherwise), converts to the device sample
//! type and pads any shortfall with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::DeviceTrait;
use lowhum_types::StopReason;
use ringbuf::HeapCons;
use ringbuf::traits::Consumer;

use crate::error::PlaybackError;
use crate::signal::StopSignal;

/// Counters updated by the callback and read by status snapshots.
#[derive(Clone, Debug, Default)]
pub struct RenderCounters {
    pub played_frames: Arc<AtomicU64>,
    pub underrun_frames: Arc<AtomicU64>,
    pub underrun_events: Arc<AtomicU64>,
}

pub struct BlockRenderer {
    source: HeapCons<f32>,
    src_channels: usize,
    dst_channels: usize,
    scratch: Vec<f32>,
    stop: StopSignal,
    counters: RenderCounters,
}

impl BlockRenderer {
    /// `max_frames` sizes the scratch buffer; larger callbacks are served in passes.
    pub fn new(
        source: HeapCons<f32>,
        src_channels: u16,
        dst_channels: u16,
        max_frames: usize,
        stop: StopSignal,
        counters: RenderCounters,
    ) -> Self {
        let src_channels = (src_channels as usize).max(1);
        Self {
            source,
            src_channels,
            dst_channels: (dst_channels as usize).max(1),
            scratch: vec![0.0; max_frames.max(1) * src_channels],
            stop,
            counters,
        }
    }

    pub fn counters(&self) -> &RenderCounters {
        &self.counters
    }

    pub fn dst_channels(&self) -> usize {
        self.dst_channels
    }

    /// Fill `out` (interleaved, device channel count) from the ring.
    pub fn render<T>(&mut self, out: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
        if self.stop.is_fired() {
            out.fill(silence);
            return;
        }

        let frames = out.len() / self.dst_channels;
        let pass_frames = self.scratch.len() / self.src_channels;
        let mut written = 0usize;

        while written < frames {
            let want = (frames - written).min(pass_frames);
            let popped = self.source.pop_slice(&mut self.scratch[..want * self.src_channels]);
            let got = popped / self.src_channels;

            for f in 0..got {
                let src = &self.scratch[f * self.src_channels..(f + 1) * self.src_channels];
                let dst_start = (written + f) * self.dst_channels;
                for ch in 0..self.dst_channels {
                    out[dst_start + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(map_channel(src, self.dst_channels, ch));
                }
            }
            written += got;
            if got < want {
                break;
            }
        }

        if written > 0 {
            self.counters
                .played_frames
                .fetch_add(written as u64, Ordering::Relaxed);
        }
        if written < frames {
            self.counters.underrun_events.fetch_add(1, Ordering::Relaxed);
            self.counters
                .underrun_frames
                .fetch_add((frames - written) as u64, Ordering::Relaxed);
        }
        out[written * self.dst_channels..].fill(silence);
    }
}

/// Output sample for `dst_ch` from one source frame.
///
/// Mapping rules:
/// - mono → any: duplicate channel 0
/// - stereo → mono: average L/R
/// - otherwise: clamp to the last available source channel
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (src.len(), dst_channels) {
        (1, _) => src[0],
        (2, 1) => 0.5 * (src[0] + src[1]),
        (n, _) => src[dst_ch.min(n - 1)],
    }
}

/// Build a CPAL output stream driven by `renderer`.
///
/// A stream error reporting the device as gone fires `stop` with
/// [`StopReason::DeviceLost`]; other stream errors are only logged.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    renderer: BlockRenderer,
    stop: StopSignal,
) -> Result<cpal::Stream, PlaybackError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, renderer, stop),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, renderer, stop),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, renderer, stop),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, renderer, stop),
        other => Err(PlaybackError::Stream(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: BlockRenderer,
    stop: StopSignal,
) -> Result<cpal::Stream, PlaybackError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if matches!(err, cpal::StreamError::DeviceNotAvailable) && stop.fire(StopReason::DeviceLost) {
            tracing::info!("output device lost; stopping session");
        }
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| renderer.render(data),
            err_fn,
            None,
        )
        .map_err(build_error)
}

/// A device that vanished between enumeration and open is reported as unavailable.
fn build_error(err: cpal::BuildStreamError) -> PlaybackError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            PlaybackError::DeviceUnavailable(err.to_string())
        }
        other => PlaybackError::Stream(other.to_string()),
    }
}

pub(crate) fn play_error(err: cpal::PlayStreamError) -> PlaybackError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => {
            PlaybackError::DeviceUnavailable(err.to_string())
        }
        other => PlaybackError::Stream(other.to_string()),
    }
}
