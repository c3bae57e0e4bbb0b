//! Streaming playback of the brown-noise asset.
//!
//! A session thread reads the asset in fixed blocks (looping at end of file),
//! resamples when the device rate differs, and feeds a lock-free ring that the
//! output callback drains. A device watcher halts the session when its device
//! goes away.

pub mod backend;
pub mod config;
pub mod control;
pub mod cpal_output;
pub mod device;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod playback;
pub mod player;
pub mod queue;
pub mod reader;
pub mod resample;
pub mod signal;
pub mod status;
pub mod watcher;

pub use backend::{AudioBackend, DeviceSelection};
pub use config::PlaybackConfig;
pub use control::{ControlError, Controller};
pub use cpal_output::CpalBackend;
pub use error::PlaybackError;
pub use player::{StartOutcome, StreamingPlayer};
pub use signal::StopSignal;
pub use watcher::{DeviceWatcher, WatchEvent, WatcherHandle, spawn_watcher};
