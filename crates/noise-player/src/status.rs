use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lowhum_types::{PlayerState, PlayerStatus, StopReason};

use crate::playback::RenderCounters;

/// Shared playback status state updated by the session thread.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    /// Selected output device name.
    pub device: Option<String>,
    /// Selected output device id.
    pub device_id: Option<String>,
    /// Sample rate the asset was written at.
    pub asset_rate: Option<u32>,
    /// Negotiated output stream rate.
    pub output_rate: Option<u32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Whether the producer resamples.
    pub resampling: Option<bool>,
    /// Counters shared with the output callback.
    pub counters: Option<RenderCounters>,
    /// Producer read offset inside the asset.
    pub read_offset: Option<Arc<AtomicU64>>,
    pub asset_frames: Option<u64>,
    /// Raised while a reader holds the asset open.
    pub asset_open: Arc<AtomicBool>,
    /// Terminal reason from the last session.
    pub end_reason: Option<StopReason>,
}

impl PlayerStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn snapshot(&self, state: PlayerState) -> PlayerStatus {
        let load = |v: &Arc<AtomicU64>| v.load(Ordering::Relaxed);
        PlayerStatus {
            state,
            device: self.device.clone(),
            device_id: self.device_id.clone(),
            asset_rate: self.asset_rate,
            output_rate: self.output_rate,
            channels: self.channels,
            resampling: self.resampling,
            played_frames: self.counters.as_ref().map(|c| load(&c.played_frames)),
            read_offset_frames: self.read_offset.as_ref().map(load),
            asset_frames: self.asset_frames,
            underrun_frames: self.counters.as_ref().map(|c| load(&c.underrun_frames)),
            underrun_events: self.counters.as_ref().map(|c| load(&c.underrun_events)),
            asset_open: self.asset_open.load(Ordering::Acquire),
            end_reason: self.end_reason,
        }
    }

    /// Clear session-specific fields when playback ends.
    pub fn clear_playback(&mut self) {
        self.device = None;
        self.device_id = None;
        self.asset_rate = None;
        self.output_rate = None;
        self.channels = None;
        self.resampling = None;
        self.counters = None;
        self.read_offset = None;
        self.asset_frames = None;
    }
}
