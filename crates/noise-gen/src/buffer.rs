//! Planar sample buffer and chunk tiling.

use std::ops::Range;

/// Planar `f32` audio: one sample vector per channel, all the same length.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseBuffer {
    sample_rate: u32,
    data: Vec<Vec<f32>>,
}

impl NoiseBuffer {
    /// Wrap planar channel data.
    ///
    /// Channels longer than the shortest one are truncated so frames stay aligned.
    pub fn new(sample_rate: u32, mut data: Vec<Vec<f32>>) -> Self {
        let frames = data.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut data {
            ch.truncate(frames);
        }
        Self { sample_rate, data }
    }

    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            data: vec![vec![0.0; frames]; channels as usize],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.data.len() as u16
    }

    pub fn frames(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.data
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index]
    }

    pub fn planes(&self) -> &[Vec<f32>] {
        &self.data
    }

    pub fn planes_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.data
    }

    /// Copy a frame range into a new buffer.
    pub fn slice_frames(&self, range: Range<usize>) -> NoiseBuffer {
        let end = range.end.min(self.frames());
        let start = range.start.min(end);
        NoiseBuffer {
            sample_rate: self.sample_rate,
            data: self.data.iter().map(|ch| ch[start..end].to_vec()).collect(),
        }
    }

    /// Split off frames `at..`, leaving `..at` in `self`.
    pub fn split_off(&mut self, at: usize) -> NoiseBuffer {
        let at = at.min(self.frames());
        NoiseBuffer {
            sample_rate: self.sample_rate,
            data: self.data.iter_mut().map(|ch| ch.split_off(at)).collect(),
        }
    }

    /// Clamp every sample into [-1.0, 1.0].
    pub fn clip(&mut self) {
        for ch in &mut self.data {
            for s in ch.iter_mut() {
                *s = s.clamp(-1.0, 1.0);
            }
        }
    }
}

/// A contiguous, non-overlapping slice of a buffer used as the normalization unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: usize,
    pub len: usize,
}

impl ChunkSpan {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// Tile `frames` into spans of `chunk_len`; only the last span may be shorter.
pub fn chunk_spans(frames: usize, chunk_len: usize) -> Vec<ChunkSpan> {
    let chunk_len = chunk_len.max(1);
    (0..frames)
        .step_by(chunk_len)
        .enumerate()
        .map(|(index, start)| ChunkSpan {
            index,
            start,
            len: chunk_len.min(frames - start),
        })
        .collect()
}
