//! Build-time generation constants.
//!
//! None of these are runtime-tunable: the binary always renders the asset from
//! [`GenerationSpec::default`]. The struct exists so tests can render short assets.

use std::path::PathBuf;

/// Asset sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
/// Asset channel count.
pub const CHANNELS: u16 = 1;
/// Requested asset length before the loop splice.
pub const DURATION_SECS: f64 = 3_600.0;
/// Unit of synthesis and filtering; bounds peak memory during generation.
pub const SEGMENT_SECS: f64 = 120.0;
/// Cumulative-sum drift segment inside the synthesizer.
pub const INTEGRATION_SECS: f64 = 30.0;
/// Chunk length for RMS normalization.
pub const NORMALIZE_CHUNK_SECS: f64 = 5.0;
/// Target RMS of every normalized chunk.
pub const TARGET_RMS: f32 = 0.3;
/// Chunks quieter than this are left unscaled.
pub const SILENCE_RMS: f32 = 1e-6;
/// Gain interpolation window spanning each chunk boundary.
pub const BOUNDARY_SMOOTH_SECS: f64 = 0.25;
/// Overlap between consecutive generation segments.
pub const SEGMENT_CROSSFADE_SECS: f64 = 1.0;
/// Tail-to-head crossfade that makes the file loop-safe.
pub const LOOP_CROSSFADE_SECS: f64 = 1.0;
/// Butterworth bandpass edges (Hz).
pub const BANDPASS_HZ: (f64, f64) = (1.0, 500.0);
pub const BANDPASS_ORDER: usize = 2;
/// Butterworth sub-bass highpass cutoff (Hz).
pub const SUB_BASS_HZ: f64 = 20.0;
pub const SUB_BASS_ORDER: usize = 1;
/// PCM bit depth of the asset.
pub const BITS_PER_SAMPLE: u16 = 16;

pub const DATA_DIR_NAME: &str = ".lowhum";
pub const ASSET_FILE_NAME: &str = "deep_brown_noise_1hr.wav";

/// `~/.lowhum`, or `None` when the home directory cannot be resolved.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR_NAME))
}

/// `~/.lowhum/deep_brown_noise_1hr.wav`.
pub fn default_asset_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join(ASSET_FILE_NAME))
}

/// Parameters of one asset render.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
    pub segment_secs: f64,
    pub integration_secs: f64,
    pub normalize_chunk_secs: f64,
    pub target_rms: f32,
    pub silence_rms: f32,
    pub boundary_smooth_secs: f64,
    pub segment_crossfade_secs: f64,
    pub loop_crossfade_secs: f64,
    /// Fixed seed; `None` draws a fresh one per render.
    pub seed: Option<u64>,
}

impl Default for GenerationSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            duration_secs: DURATION_SECS,
            segment_secs: SEGMENT_SECS,
            integration_secs: INTEGRATION_SECS,
            normalize_chunk_secs: NORMALIZE_CHUNK_SECS,
            target_rms: TARGET_RMS,
            silence_rms: SILENCE_RMS,
            boundary_smooth_secs: BOUNDARY_SMOOTH_SECS,
            segment_crossfade_secs: SEGMENT_CROSSFADE_SECS,
            loop_crossfade_secs: LOOP_CROSSFADE_SECS,
            seed: None,
        }
    }
}

impl GenerationSpec {
    /// Convert seconds to frames at the render sample rate.
    pub fn frames_for(&self, secs: f64) -> usize {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        (secs * self.sample_rate as f64).round() as usize
    }

    /// Frames requested before the loop splice.
    pub fn total_frames(&self) -> usize {
        self.frames_for(self.duration_secs)
    }

    pub fn segment_frames(&self) -> usize {
        self.frames_for(self.segment_secs).max(1)
    }

    pub fn chunk_frames(&self) -> usize {
        self.frames_for(self.normalize_chunk_secs).max(1)
    }

    /// Segment overlap, never more than half a segment.
    pub fn segment_crossfade_frames(&self) -> usize {
        self.frames_for(self.segment_crossfade_secs)
            .min(self.segment_frames() / 2)
    }

    /// Loop window, shrunk to half the asset for very short renders.
    pub fn loop_frames(&self) -> usize {
        self.frames_for(self.loop_crossfade_secs)
            .min(self.total_frames() / 2)
    }

    /// Frame count of the file on disk.
    pub fn expected_asset_frames(&self) -> usize {
        self.total_frames() - self.loop_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_matches_constants() {
        let spec = GenerationSpec::default();
        assert_eq!(spec.total_frames(), 3_600 * 44_100);
        assert_eq!(spec.loop_frames(), 44_100);
        assert_eq!(spec.expected_asset_frames(), 3_599 * 44_100);
    }

    #[test]
    fn loop_window_shrinks_for_short_assets() {
        let spec = GenerationSpec {
            sample_rate: 1_000,
            duration_secs: 1.0,
            loop_crossfade_secs: 2.0,
            ..GenerationSpec::default()
        };
        assert_eq!(spec.loop_frames(), 500);
        assert_eq!(spec.expected_asset_frames(), 500);
    }

    #[test]
    fn frames_for_rejects_non_positive() {
        let spec = GenerationSpec::default();
        assert_eq!(spec.frames_for(0.0), 0);
        assert_eq!(spec.frames_for(-1.0), 0);
        assert_eq!(spec.frames_for(f64::NAN), 0);
    }
}
