//! Validate-or-regenerate handling of the on-disk asset.

use std::path::{Path, PathBuf};

use crate::config::{BITS_PER_SAMPLE, GenerationSpec};
use crate::error::AssetError;
use crate::pipeline::generate_asset;
use crate::writer::{AssetHeader, read_header};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
    Reused(AssetHeader),
    Generated(AssetHeader),
}

impl CacheOutcome {
    pub fn header(&self) -> &AssetHeader {
        match self {
            CacheOutcome::Reused(h) | CacheOutcome::Generated(h) => h,
        }
    }

    pub fn was_generated(&self) -> bool {
        matches!(self, CacheOutcome::Generated(_))
    }
}

#[derive(Clone, Debug)]
pub struct AssetCache {
    path: PathBuf,
    spec: GenerationSpec,
}

impl AssetCache {
    pub fn new(path: impl Into<PathBuf>, spec: GenerationSpec) -> Self {
        Self {
            path: path.into(),
            spec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &GenerationSpec {
        &self.spec
    }

    pub fn expected_frames(&self) -> u64 {
        self.spec.expected_asset_frames() as u64
    }

    /// Check the file on disk against the expected format without reading the payload.
    pub fn validate(&self) -> Result<AssetHeader, AssetError> {
        let header = read_header(&self.path)?;
        let mismatch = |what: &str, found: u64, want: u64| {
            AssetError::corrupt(&self.path, format!("{what} is {found}, expected {want}"))
        };
        if header.sample_rate != self.spec.sample_rate {
            return Err(mismatch(
                "sample rate",
                header.sample_rate as u64,
                self.spec.sample_rate as u64,
            ));
        }
        if header.channels != self.spec.channels {
            return Err(mismatch(
                "channel count",
                header.channels as u64,
                self.spec.channels as u64,
            ));
        }
        if header.bits_per_sample != BITS_PER_SAMPLE {
            return Err(mismatch(
                "bit depth",
                header.bits_per_sample as u64,
                BITS_PER_SAMPLE as u64,
            ));
        }
        if header.frames != self.expected_frames() {
            return Err(mismatch("frame count", header.frames, self.expected_frames()));
        }
        if header.is_truncated() {
            return Err(mismatch(
                "file size",
                header.file_len,
                header.data_offset + header.data_len,
            ));
        }
        Ok(header)
    }

    /// Reuse a valid asset, otherwise replace whatever is there with a fresh render.
    pub fn ensure(&self) -> Result<CacheOutcome, AssetError> {
        match self.validate() {
            Ok(header) => {
                tracing::debug!(path = %self.path.display(), "asset cache hit");
                Ok(CacheOutcome::Reused(header))
            }
            Err(err) if err.is_recoverable() => {
                if !matches!(err, AssetError::Missing(_)) {
                    tracing::warn!(error = %err, "discarding invalid asset");
                }
                self.regenerate().map(CacheOutcome::Generated)
            }
            Err(err) => Err(err),
        }
    }

    /// Render unconditionally. The existing file is only replaced once the new
    /// render commits, so a failed render leaves it in place.
    pub fn regenerate(&self) -> Result<AssetHeader, AssetError> {
        generate_asset(&self.spec, &self.path)
    }
}
