/// Playback tuning parameters shared by the reader, resampler and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Reader/resampler block size in frames.
    pub chunk_frames: usize,
    /// Target ring duration; bounds latency and memory.
    pub buffer_seconds: f32,
    /// Producer back-off when the ring is full.
    pub fill_sleep_ms: u64,
    /// How long `start` waits for the session to report readiness.
    pub ready_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            buffer_seconds: 0.5,
            fill_sleep_ms: 5,
            ready_timeout_ms: 5_000,
        }
    }
}
