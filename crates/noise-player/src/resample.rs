//! Streaming resample stage.
//!
//! Uses Rubato to convert interleaved `f32` blocks read from the asset to the
//! output device rate. Runs on the producer thread; every call consumes exactly
//! one input chunk and returns however many output frames that chunk produced.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::PlaybackError;

pub struct StreamResampler {
    inner: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    out: Vec<f32>,
    indexing: Indexing,
}

impl StreamResampler {
    /// Build a sinc resampler taking `chunk_frames` input frames per call.
    pub fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self, PlaybackError> {
        if src_rate == 0 || dst_rate == 0 || channels == 0 {
            return Err(PlaybackError::Resample(format!(
                "invalid resampler shape: {src_rate} Hz -> {dst_rate} Hz, {channels} ch"
            )));
        }
        let chunk_frames = chunk_frames.max(1);
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let inner = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| PlaybackError::Resample(e.to_string()))?;
        let out = vec![0.0f32; inner.output_frames_max() * channels];

        tracing::debug!(
            from_hz = src_rate,
            to_hz = dst_rate,
            channels,
            chunk_frames,
            "resampler ready"
        );
        Ok(Self {
            inner,
            channels,
            chunk_frames,
            out,
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Resample one chunk. `input` must hold exactly `chunk_frames` interleaved frames.
    pub fn process(&mut self, input: &[f32]) -> Result<&[f32], PlaybackError> {
        if input.len() != self.chunk_frames * self.channels {
            return Err(PlaybackError::Resample(format!(
                "expected {} samples, got {}",
                self.chunk_frames * self.channels,
                input.len()
            )));
        }

        let input_adapter = InterleavedSlice::new(input, self.channels, self.chunk_frames)
            .map_err(resample_err)?;
        let out_capacity_frames = self.out.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity_frames)
                .map_err(resample_err)?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = None;
        let (_nbr_in, nbr_out) = self
            .inner
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(resample_err)?;

        Ok(&self.out[..nbr_out * self.channels])
    }
}

fn resample_err(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Resample(e.to_string())
}
