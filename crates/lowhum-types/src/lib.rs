use serde::{Deserialize, Serialize};

/// Output device metadata as reported by the audio host.
///
/// Descriptors are rebuilt on every enumeration and never persisted; `id` is the
/// only field callers should use to select a device.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Opaque, host-provided device id.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// `true` when this is the host's current default output.
    pub is_default: bool,
    /// Largest channel count any supported output config offers.
    pub max_output_channels: u16,
    /// Lowest supported output sample rate (Hz).
    pub min_rate: u32,
    /// Highest supported output sample rate (Hz).
    pub max_rate: u32,
    /// Sample rate of the device's default output config, if known.
    pub default_rate: Option<u32>,
}

/// Lifecycle of the streaming player.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Opening,
    Streaming,
    Stopping,
}

impl PlayerState {
    pub fn as_u8(self) -> u8 {
        match self {
            PlayerState::Idle => 0,
            PlayerState::Opening => 1,
            PlayerState::Streaming => 2,
            PlayerState::Stopping => 3,
        }
    }

    /// Decode a stored state; unknown values read as `Idle`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayerState::Opening,
            2 => PlayerState::Streaming,
            3 => PlayerState::Stopping,
            _ => PlayerState::Idle,
        }
    }
}

/// Reason a playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit `stop()` or a device switch.
    Stopped,
    /// The active output device disappeared.
    DeviceLost,
    /// The host default output changed while following the default.
    DefaultChanged,
    /// Reader, resampler, or output stream failure.
    Error,
}

impl StopReason {
    pub fn as_u8(self) -> u8 {
        match self {
            StopReason::Stopped => 1,
            StopReason::DeviceLost => 2,
            StopReason::DefaultChanged => 3,
            StopReason::Error => 4,
        }
    }

    /// Decode a stored reason; `0` means "not stopped".
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(StopReason::Stopped),
            2 => Some(StopReason::DeviceLost),
            3 => Some(StopReason::DefaultChanged),
            4 => Some(StopReason::Error),
            _ => None,
        }
    }

    /// Short user-facing message, used for notifications.
    pub fn describe(self) -> &'static str {
        match self {
            StopReason::Stopped => "playback stopped",
            StopReason::DeviceLost => "audio stopped: output device disconnected",
            StopReason::DefaultChanged => "audio stopped: default output device changed",
            StopReason::Error => "audio stopped: playback error",
        }
    }
}

/// Point-in-time playback status.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    pub state: PlayerState,
    /// Active output device name.
    pub device: Option<String>,
    /// Active output device id.
    pub device_id: Option<String>,
    /// Asset sample rate (Hz).
    pub asset_rate: Option<u32>,
    /// Output stream sample rate (Hz).
    pub output_rate: Option<u32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Whether the producer is resampling the asset.
    pub resampling: Option<bool>,
    /// Frames handed to the device since the session started.
    pub played_frames: Option<u64>,
    /// Producer read offset inside the asset (frames, wraps at end of file).
    pub read_offset_frames: Option<u64>,
    /// Total frames in the asset.
    pub asset_frames: Option<u64>,
    /// Frames emitted as silence because the ring ran dry.
    pub underrun_frames: Option<u64>,
    /// Number of callbacks that hit an underrun.
    pub underrun_events: Option<u64>,
    /// `true` while a session holds the asset file open.
    pub asset_open: bool,
    /// Why the last session ended.
    pub end_reason: Option<StopReason>,
}
