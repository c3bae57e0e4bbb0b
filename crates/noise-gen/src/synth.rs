//! Brown-noise synthesis: integrated Gaussian noise, band-limited with
//! zero-phase Butterworth filters.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::buffer::NoiseBuffer;
use crate::config::{BANDPASS_HZ, BANDPASS_ORDER, INTEGRATION_SECS, SUB_BASS_HZ, SUB_BASS_ORDER};
use crate::error::SynthesisError;
use crate::filter::{FilterSpec, SosFilter};

/// SplitMix64 finalizer; derives independent stream seeds from a base seed.
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Clone, Debug)]
pub struct NoiseSynthesizer {
    seed: u64,
    integration_secs: f64,
}

impl NoiseSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            integration_secs: INTEGRATION_SECS,
        }
    }

    pub fn with_integration_secs(mut self, secs: f64) -> Self {
        self.integration_secs = secs;
        self
    }

    /// Render `round(duration_secs * sample_rate)` frames of band-limited brown noise.
    pub fn synthesize(
        &self,
        duration_secs: f64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<NoiseBuffer, SynthesisError> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SynthesisError::InvalidDuration(duration_secs));
        }
        let frames = (duration_secs * sample_rate as f64).round() as usize;
        if sample_rate > 0 && frames == 0 {
            return Err(SynthesisError::InvalidDuration(duration_secs));
        }
        self.synthesize_frames(frames, sample_rate, channels)
    }

    /// Frame-exact variant used by the segmented generator.
    pub fn synthesize_frames(
        &self,
        frames: usize,
        sample_rate: u32,
        channels: u16,
    ) -> Result<NoiseBuffer, SynthesisError> {
        if sample_rate == 0 {
            return Err(SynthesisError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(SynthesisError::InvalidChannels);
        }
        if frames == 0 {
            return Err(SynthesisError::InvalidDuration(0.0));
        }

        let bandpass =
            FilterSpec::bandpass(BANDPASS_HZ.0, BANDPASS_HZ.1, BANDPASS_ORDER, sample_rate).design()?;
        let sub_bass = FilterSpec::highpass(SUB_BASS_HZ, SUB_BASS_ORDER, sample_rate).design()?;
        let segment = ((self.integration_secs * sample_rate as f64).round() as usize).max(1);

        let mut planes = Vec::with_capacity(channels as usize);
        for channel in 0..channels {
            let mut walk = self.integrate(channel, frames, segment)?;
            band_limit(&mut walk, &bandpass, &sub_bass);
            if walk.iter().any(|v| !v.is_finite()) {
                return Err(SynthesisError::NumericOverflow {
                    channel,
                    segment: 0,
                });
            }
            planes.push(walk.into_iter().map(|v| v as f32).collect::<Vec<f32>>());
        }
        Ok(NoiseBuffer::new(sample_rate, planes))
    }

    /// Running sum of white noise, re-centred per integration segment.
    ///
    /// The running value carries across segments. Each segment's mean is removed
    /// with a ramp from 0 to the full mean, so the waveform stays continuous and the
    /// value at every segment end depends only on that segment's own noise.
    pub(crate) fn integrate(
        &self,
        channel: u16,
        frames: usize,
        segment: usize,
    ) -> Result<Vec<f64>, SynthesisError> {
        let mut out = Vec::with_capacity(frames);
        let mut carry = 0.0f64;
        for (index, start) in (0..frames).step_by(segment).enumerate() {
            let len = segment.min(frames - start);
            let stream = ((channel as u64) << 32) | index as u64;
            let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, stream));

            let begin = out.len();
            let mut acc = carry;
            for _ in 0..len {
                let step: f64 = StandardNormal.sample(&mut rng);
                acc += step;
                out.push(acc);
            }

            let block = &mut out[begin..];
            let mean = block.iter().sum::<f64>() / len as f64;
            let n = len as f64;
            for (i, v) in block.iter_mut().enumerate() {
                *v -= mean * (i + 1) as f64 / n;
            }
            carry = block[len - 1];
            if !carry.is_finite() {
                return Err(SynthesisError::NumericOverflow {
                    channel,
                    segment: index,
                });
            }
        }
        Ok(out)
    }
}

fn band_limit(data: &mut [f64], bandpass: &SosFilter, sub_bass: &SosFilter) {
    bandpass.filtfilt(data);
    sub_bass.filtfilt(data);
}
