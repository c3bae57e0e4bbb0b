//! Segmented asset render: synthesize, normalize, smooth, stitch, splice, write.
//!
//! Work proceeds one generation segment at a time so peak memory stays at about
//! two segments regardless of the asset length.

use std::path::Path;
use std::time::Instant;

use crate::buffer::{NoiseBuffer, chunk_spans};
use crate::config::GenerationSpec;
use crate::crossfade::{FadeCurve, LoopSplicer, overlap_join, smooth_boundaries};
use crate::error::{AssetError, SynthesisError};
use crate::normalize::ChunkNormalizer;
use crate::synth::{NoiseSynthesizer, mix_seed};
use crate::writer::{AssetHeader, AssetWriter};

const CURVE: FadeCurve = FadeCurve::Cosine;

/// Render `spec` into a loop-safe WAV at `path`.
///
/// Nothing appears at `path` unless the whole render succeeds.
pub fn generate_asset(spec: &GenerationSpec, path: &Path) -> Result<AssetHeader, AssetError> {
    if spec.sample_rate == 0 {
        return Err(SynthesisError::InvalidSampleRate(spec.sample_rate).into());
    }
    if spec.channels == 0 {
        return Err(SynthesisError::InvalidChannels.into());
    }
    let total = spec.total_frames();
    if total == 0 {
        return Err(SynthesisError::InvalidDuration(spec.duration_secs).into());
    }

    let seed = spec.seed.unwrap_or_else(rand::random);
    let overlap = spec.segment_crossfade_frames();
    let smooth_window = spec.frames_for(spec.boundary_smooth_secs);
    let normalizer = ChunkNormalizer::from_spec(spec);
    let segments = chunk_spans(total, spec.segment_frames());
    let started = Instant::now();

    tracing::info!(
        path = %path.display(),
        frames = total,
        segments = segments.len(),
        seed,
        "generating brown noise asset"
    );

    let mut writer = AssetWriter::create(path, spec.sample_rate, spec.channels)?;
    let mut splicer = LoopSplicer::new(spec.sample_rate, spec.channels, spec.loop_frames(), CURVE);
    let mut held_tail: Option<NoiseBuffer> = None;

    for (i, segment) in segments.iter().enumerate() {
        let extra = segments
            .get(i + 1)
            .map(|next| overlap.min(next.len))
            .unwrap_or(0);
        let synth = NoiseSynthesizer::new(mix_seed(seed, segment.index as u64))
            .with_integration_secs(spec.integration_secs);
        let mut block =
            synth.synthesize_frames(segment.len + extra, spec.sample_rate, spec.channels)?;

        let gains = normalizer.normalize(&mut block);
        smooth_boundaries(&mut block, &gains, smooth_window, CURVE);

        if let Some(tail) = held_tail.take() {
            for (prev, next) in tail.planes().iter().zip(block.planes_mut()) {
                overlap_join(prev, next, CURVE);
            }
        }
        let tail = block.split_off(segment.len);
        if extra > 0 {
            held_tail = Some(tail);
        }

        if let Some(ready) = splicer.push(&block) {
            writer.write_frames(&ready)?;
        }
        tracing::info!(
            segment = segment.index + 1,
            of = segments.len(),
            written = writer.frames_written(),
            "segment rendered"
        );
    }
    writer.write_frames(&splicer.finish())?;

    let expected = spec.expected_asset_frames() as u64;
    if writer.frames_written() != expected {
        return Err(AssetError::corrupt(
            writer.partial_path(),
            format!(
                "rendered {} frames, expected {expected}",
                writer.frames_written()
            ),
        ));
    }
    let header = writer.commit()?;
    tracing::info!(
        path = %path.display(),
        frames = header.frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "asset ready"
    );
    Ok(header)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::writer::tests::temp_dir;

    pub(crate) fn short_spec(seed: u64) -> GenerationSpec {
        GenerationSpec {
            sample_rate: 8_000,
            channels: 1,
            duration_secs: 6.0,
            segment_secs: 2.0,
            integration_secs: 0.5,
            normalize_chunk_secs: 0.5,
            boundary_smooth_secs: 0.05,
            segment_crossfade_secs: 0.25,
            loop_crossfade_secs: 0.5,
            seed: Some(seed),
            ..GenerationSpec::default()
        }
    }

    #[test]
    fn renders_expected_length_and_format() {
        let dir = temp_dir("pipeline");
        let path = dir.join("asset.wav");
        let spec = short_spec(1);
        let header = generate_asset(&spec, &path).unwrap();
        assert_eq!(header.frames, 44_000);
        assert_eq!(header.frames as usize, spec.expected_asset_frames());
        assert_eq!(header.sample_rate, 8_000);
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 16);
        assert!(!header.is_truncated());
    }

    #[test]
    fn rendered_samples_are_in_range_and_near_target() {
        let dir = temp_dir("pipeline-level");
        let path = dir.join("asset.wav");
        generate_asset(&short_spec(2), &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / i16::MAX as f32)
            .collect();
        let level = crate::normalize::rms(&samples);
        assert!((0.2..0.35).contains(&level), "rms {level}");
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn loop_wrap_and_segment_joins_are_continuous() {
        let dir = temp_dir("pipeline-seams");
        let path = dir.join("asset.wav");
        let spec = short_spec(6);
        generate_asset(&spec, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let x: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / i16::MAX as f32)
            .collect();
        assert_eq!(x.len(), spec.expected_asset_frames());
        assert!(x.iter().all(|s| (-1.0..=1.0).contains(s)));

        // File positions where one render block meets the next: each segment
        // join, and the start of the tail/head blend.
        let window = spec.loop_frames();
        let segment = spec.segment_frames();
        let total = spec.total_frames();
        let mut joins: Vec<usize> = (1..total.div_ceil(segment))
            .map(|k| k * segment - window)
            .collect();
        joins.push(total - 2 * window);
        assert_eq!(joins, vec![12_000, 28_000, 40_000]);

        let step = |n: usize| (x[n] - x[n - 1]).abs();
        let interior = (1..x.len())
            .filter(|n| !joins.contains(n))
            .map(step)
            .fold(0.0f32, f32::max);
        for &n in &joins {
            assert!(
                step(n) <= interior,
                "join at {n}: step {} vs interior max {interior}",
                step(n)
            );
        }
        let wrap = (x[0] - x[x.len() - 1]).abs();
        assert!(wrap <= interior, "wrap step {wrap} vs interior max {interior}");
    }

    #[test]
    fn stereo_render() {
        let dir = temp_dir("pipeline-stereo");
        let path = dir.join("asset.wav");
        let spec = GenerationSpec {
            channels: 2,
            duration_secs: 2.0,
            ..short_spec(3)
        };
        let header = generate_asset(&spec, &path).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.frames as usize, spec.expected_asset_frames());
    }

    #[test]
    fn invalid_spec_writes_nothing() {
        let dir = temp_dir("pipeline-invalid");
        let path = dir.join("asset.wav");
        let spec = GenerationSpec {
            sample_rate: 900,
            ..short_spec(4)
        };
        let err = generate_asset(&spec, &path).unwrap_err();
        assert!(matches!(err, AssetError::Synthesis(SynthesisError::InvalidFilter(_))));
        assert!(!path.exists());
        assert!(!dir.join("asset.wav.partial").exists());
    }
}
