use std::path::{Path, PathBuf};

use thiserror::Error;

/// Invalid synthesis parameters or a numeric failure while rendering.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("duration must be positive and finite, got {0}")]
    InvalidDuration(f64),
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),
    #[error("channel count must be at least 1")]
    InvalidChannels,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("cumulative sum overflowed (channel {channel}, segment {segment})")]
    NumericOverflow { channel: u16, segment: usize },
}

/// Failure reading, validating, or writing the cached asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0:?} does not exist")]
    Missing(PathBuf),
    #[error("asset {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("wav encode error on {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

impl AssetError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        AssetError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        AssetError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(path: &Path, source: hound::Error) -> Self {
        match source {
            hound::Error::IoError(source) => AssetError::io(path, source),
            other => AssetError::Encode {
                path: path.to_path_buf(),
                source: other,
            },
        }
    }

    /// Missing or corrupt assets are recoverable by regenerating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AssetError::Missing(_) | AssetError::Corrupt { .. })
    }
}
