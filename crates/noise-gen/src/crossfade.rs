//! Fade curves, chunk-boundary gain smoothing, segment overlap joins, and the
//! loop splice that makes the asset's last sample flow into its first.

use crate::buffer::NoiseBuffer;
use crate::normalize::ChunkGain;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FadeCurve {
    Linear,
    /// Raised cosine: zero slope at both ends.
    #[default]
    Cosine,
}

impl FadeCurve {
    /// Rising weight at position `t` in [0, 1].
    pub fn fade_in(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::Cosine => 0.5 - 0.5 * (std::f32::consts::PI * t).cos(),
        }
    }

    /// Falling weight; `fade_in(t) + fade_out(t) == 1` exactly.
    pub fn fade_out(self, t: f32) -> f32 {
        1.0 - self.fade_in(t)
    }

    /// Normalized position of offset `i` within a window of `n` samples.
    fn position(i: usize, n: usize) -> f32 {
        if n <= 1 {
            0.5
        } else {
            i as f32 / (n - 1) as f32
        }
    }
}

/// Replace the hard gain step at each chunk boundary with an interpolated ramp.
///
/// `gains` must come from normalizing `buf` (same spans, same channel count). The
/// ramp spans `window_frames` centred on the boundary, clamped to half of the
/// shorter neighbouring chunk. Boundaries touching a silent chunk are skipped.
pub fn smooth_boundaries(
    buf: &mut NoiseBuffer,
    gains: &[ChunkGain],
    window_frames: usize,
    curve: FadeCurve,
) {
    for pair in gains.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        let half = (window_frames / 2)
            .min(left.span.len / 2)
            .min(right.span.len / 2);
        if half == 0 {
            continue;
        }
        let boundary = right.span.start;
        let start = boundary - half;
        let width = 2 * half;

        for (ch, plane) in buf.planes_mut().iter_mut().enumerate() {
            if left.silent[ch] || right.silent[ch] {
                continue;
            }
            let (g_left, g_right) = (left.gains[ch], right.gains[ch]);
            for i in 0..width {
                let t = FadeCurve::position(i, width);
                let target = g_left * curve.fade_out(t) + g_right * curve.fade_in(t);
                let applied = if start + i < boundary { g_left } else { g_right };
                let s = &mut plane[start + i];
                *s = (*s * target / applied).clamp(-1.0, 1.0);
            }
        }
    }
}

/// Overlap-add `prev_tail` into the start of `next_head`: the result fades from
/// the previous segment into the next over `min(len)` samples.
pub fn overlap_join(prev_tail: &[f32], next_head: &mut [f32], curve: FadeCurve) {
    let n = prev_tail.len().min(next_head.len());
    for i in 0..n {
        let t = FadeCurve::position(i, n);
        next_head[i] = prev_tail[i] * curve.fade_out(t) + next_head[i] * curve.fade_in(t);
    }
}

/// Streaming loop splice.
///
/// The first `window` frames are held back as the head and the last `window`
/// frames are kept in a delay line. Everything in between is emitted as it
/// arrives; [`LoopSplicer::finish`] emits `tail * fade_out + head * fade_in`.
/// Output length is `input - window`, and its last frame flows into its first.
#[derive(Debug)]
pub struct LoopSplicer {
    window: usize,
    curve: FadeCurve,
    sample_rate: u32,
    head: Vec<Vec<f32>>,
    pending: Vec<Vec<f32>>,
    emitted: usize,
}

impl LoopSplicer {
    pub fn new(sample_rate: u32, channels: u16, window: usize, curve: FadeCurve) -> Self {
        Self {
            window,
            curve,
            sample_rate,
            head: vec![Vec::with_capacity(window); channels as usize],
            pending: vec![Vec::new(); channels as usize],
            emitted: 0,
        }
    }

    fn head_len(&self) -> usize {
        self.head.first().map(Vec::len).unwrap_or(0)
    }

    fn pending_len(&self) -> usize {
        self.pending.first().map(Vec::len).unwrap_or(0)
    }

    /// Feed the next frames; returns whatever can be emitted already.
    pub fn push(&mut self, chunk: &NoiseBuffer) -> Option<NoiseBuffer> {
        let take_head = (self.window - self.head_len()).min(chunk.frames());
        for (ch, (head, pending)) in self.head.iter_mut().zip(self.pending.iter_mut()).enumerate() {
            let src = chunk.channel(ch);
            head.extend_from_slice(&src[..take_head]);
            pending.extend_from_slice(&src[take_head..]);
        }

        let ready = self.pending_len().saturating_sub(self.window);
        if ready == 0 {
            return None;
        }
        let out: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|p| p.drain(..ready).collect())
            .collect();
        self.emitted += ready;
        Some(NoiseBuffer::new(self.sample_rate, out))
    }

    /// Emit the blended seam. Inputs shorter than two windows are spliced with a
    /// window of half their length instead.
    pub fn finish(mut self) -> NoiseBuffer {
        let total = self.head_len() + self.pending_len() + self.emitted;
        if self.emitted == 0 && total < 2 * self.window {
            let full: Vec<Vec<f32>> = self
                .head
                .iter()
                .zip(&self.pending)
                .map(|(h, p)| h.iter().chain(p).copied().collect())
                .collect();
            let n = total / 2;
            let mut out = Vec::with_capacity(full.len());
            for plane in &full {
                let mut ch = plane[n..total - n].to_vec();
                ch.extend(blend(&plane[total - n..], &plane[..n], self.curve));
                out.push(ch);
            }
            return NoiseBuffer::new(self.sample_rate, out);
        }

        let out = self
            .pending
            .iter_mut()
            .zip(&self.head)
            .map(|(tail, head)| blend(tail, head, self.curve))
            .collect();
        NoiseBuffer::new(self.sample_rate, out)
    }
}

fn blend(tail: &[f32], head: &[f32], curve: FadeCurve) -> Vec<f32> {
    let n = tail.len().min(head.len());
    (0..n)
        .map(|i| {
            let t = FadeCurve::position(i, n);
            tail[i] * curve.fade_out(t) + head[i] * curve.fade_in(t)
        })
        .collect()
}

/// Buffer-level loop splice: output is `frames - window` long.
pub fn loop_crossfade(buf: &NoiseBuffer, window: usize, curve: FadeCurve) -> NoiseBuffer {
    let mut splicer = LoopSplicer::new(buf.sample_rate(), buf.channels(), window, curve);
    let body = splicer.push(buf);
    let seam = splicer.finish();
    match body {
        Some(mut body) => {
            for (dst, src) in body.planes_mut().iter_mut().zip(seam.planes()) {
                dst.extend_from_slice(src);
            }
            body
        }
        None => seam,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ChunkNormalizer;
    use crate::synth::NoiseSynthesizer;

    fn second_diff(x: &[f32], i: usize) -> f32 {
        (x[i + 1] - 2.0 * x[i] + x[i - 1]).abs()
    }

    #[test]
    fn fade_pairs_sum_to_unity() {
        for curve in [FadeCurve::Linear, FadeCurve::Cosine] {
            for i in 0..=100 {
                let t = i as f32 / 100.0;
                assert_eq!(curve.fade_in(t) + curve.fade_out(t), 1.0);
            }
            assert_eq!(curve.fade_in(0.0), 0.0);
            assert_eq!(curve.fade_in(1.0), 1.0);
        }
    }

    #[test]
    fn smoothing_turns_gain_step_into_ramp() {
        let alt = |amp: f32, n: usize| -> Vec<f32> {
            (0..n).map(|i| if i % 2 == 0 { amp } else { -amp }).collect()
        };
        let mut input = alt(0.1, 100);
        input.extend(alt(0.2, 100));
        let mut buf = NoiseBuffer::new(100, vec![input.clone()]);
        let gains = ChunkNormalizer::new(100, 0.3).normalize(&mut buf);
        assert!((gains[0].gains[0] - 3.0).abs() < 1e-5);
        assert!((gains[1].gains[0] - 1.5).abs() < 1e-6);

        smooth_boundaries(&mut buf, &gains, 40, FadeCurve::Linear);
        let ratio: Vec<f32> = buf
            .channel(0)
            .iter()
            .zip(&input)
            .map(|(o, i)| o / i)
            .collect();
        assert!((ratio[79] - 3.0).abs() < 1e-5);
        assert!((ratio[120] - 1.5).abs() < 1e-5);
        for w in ratio[80..120].windows(2) {
            assert!(w[1] <= w[0] + 1e-6, "gain not monotone");
            assert!(w[0] - w[1] < 0.1, "gain step too large");
        }
    }

    #[test]
    fn smoothing_skips_silent_neighbours() {
        let mut input = vec![0.0f32; 100];
        input.extend((0..100).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }));
        let mut buf = NoiseBuffer::new(100, vec![input]);
        let gains = ChunkNormalizer::new(100, 0.3).normalize(&mut buf);
        let before = buf.clone();
        smooth_boundaries(&mut buf, &gains, 40, FadeCurve::Cosine);
        assert_eq!(buf, before);
    }

    #[test]
    fn overlap_join_fades_between_segments() {
        let tail = vec![1.0f32; 5];
        let mut head = vec![0.0f32; 8];
        overlap_join(&tail, &mut head, FadeCurve::Linear);
        assert_eq!(head[0], 1.0);
        assert_eq!(head[4], 0.0);
        assert!((head[2] - 0.5).abs() < 1e-6);
        assert_eq!(&head[5..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn loop_splice_shortens_by_window() {
        let buf = NoiseBuffer::new(10, vec![(0..100).map(|v| v as f32).collect()]);
        let out = loop_crossfade(&buf, 10, FadeCurve::Linear);
        assert_eq!(out.frames(), 90);
        assert_eq!(out.channel(0)[0], 10.0);
        // Seam starts as pure tail and ends as pure head.
        assert_eq!(out.channel(0)[80], 90.0);
        assert_eq!(out.channel(0)[89], 9.0);
    }

    #[test]
    fn streaming_splice_matches_buffer_splice() {
        let buf = NoiseBuffer::new(10, vec![(0..97).map(|v| (v as f32).sin()).collect()]);
        let whole = loop_crossfade(&buf, 12, FadeCurve::Cosine);

        let mut splicer = LoopSplicer::new(10, 1, 12, FadeCurve::Cosine);
        let mut streamed: Vec<f32> = Vec::new();
        for start in (0..97).step_by(7) {
            if let Some(out) = splicer.push(&buf.slice_frames(start..start + 7)) {
                streamed.extend_from_slice(out.channel(0));
            }
        }
        streamed.extend_from_slice(splicer.finish().channel(0));
        assert_eq!(streamed, whole.channel(0));
    }

    #[test]
    fn short_input_shrinks_window() {
        let buf = NoiseBuffer::new(10, vec![(0..10).map(|v| v as f32).collect()]);
        let out = loop_crossfade(&buf, 8, FadeCurve::Linear);
        assert_eq!(out.frames(), 5);
    }

    #[test]
    fn loop_seam_is_as_smooth_as_the_interior() {
        let mut buf = NoiseSynthesizer::new(17).synthesize(3.0, 8_000, 1).unwrap();
        ChunkNormalizer::new(8_000, 0.3).normalize(&mut buf);
        let looped = loop_crossfade(&buf, 800, FadeCurve::Cosine);

        let x = looped.channel(0);
        let interior = (1..x.len() - 1)
            .map(|i| second_diff(x, i))
            .fold(0.0f32, f32::max);
        let mut twice = x.to_vec();
        twice.extend_from_slice(x);
        let seam = x.len();
        for i in seam - 2..seam + 2 {
            assert!(second_diff(&twice, i) <= interior + 1e-6, "seam discontinuity at {i}");
        }
    }
}
