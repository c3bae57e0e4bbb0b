use noise_gen::AssetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Requested device is not among the current outputs.
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error(transparent)]
    Asset(#[from] AssetError),
    /// Output stream could not be built or started.
    #[error("output stream error: {0}")]
    Stream(String),
    #[error("asset decode error: {0}")]
    Decode(String),
    #[error("device enumeration failed: {0}")]
    Enumerate(String),
    #[error("resampler error: {0}")]
    Resample(String),
}
