//! Per-chunk RMS normalization.

use crate::buffer::{ChunkSpan, NoiseBuffer, chunk_spans};
use crate::config::GenerationSpec;

/// Root-mean-square of `samples`, accumulated in `f64`. Empty input is 0.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Gains applied to one chunk, one entry per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkGain {
    pub span: ChunkSpan,
    pub gains: Vec<f32>,
    pub rms_before: Vec<f32>,
    pub silent: Vec<bool>,
}

#[derive(Clone, Copy, Debug)]
pub struct ChunkNormalizer {
    chunk_frames: usize,
    target_rms: f32,
    silence_rms: f32,
}

impl ChunkNormalizer {
    pub fn new(chunk_frames: usize, target_rms: f32) -> Self {
        Self {
            chunk_frames: chunk_frames.max(1),
            target_rms,
            silence_rms: crate::config::SILENCE_RMS,
        }
    }

    pub fn with_silence_threshold(mut self, silence_rms: f32) -> Self {
        self.silence_rms = silence_rms;
        self
    }

    pub fn from_spec(spec: &GenerationSpec) -> Self {
        Self::new(spec.chunk_frames(), spec.target_rms).with_silence_threshold(spec.silence_rms)
    }

    /// Scale every chunk of every channel to the target RMS, then hard-clip.
    ///
    /// Chunks quieter than the silence threshold keep unit gain.
    pub fn normalize(&self, buf: &mut NoiseBuffer) -> Vec<ChunkGain> {
        let spans = chunk_spans(buf.frames(), self.chunk_frames);
        let mut out = Vec::with_capacity(spans.len());
        for span in spans {
            let mut gains = Vec::with_capacity(buf.channels() as usize);
            let mut rms_before = Vec::with_capacity(gains.capacity());
            let mut silent = Vec::with_capacity(gains.capacity());
            for plane in buf.planes_mut() {
                let chunk = &mut plane[span.range()];
                let level = rms(chunk);
                let is_silent = level < self.silence_rms;
                let gain = if is_silent { 1.0 } else { self.target_rms / level };
                if !is_silent {
                    for s in chunk.iter_mut() {
                        *s = (*s * gain).clamp(-1.0, 1.0);
                    }
                }
                gains.push(gain);
                rms_before.push(level);
                silent.push(is_silent);
            }
            out.push(ChunkGain {
                span,
                gains,
                rms_before,
                silent,
            });
        }
        buf.clip();
        out
    }
}
