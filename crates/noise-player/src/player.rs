//! Streaming player.
//!
//! One playback session at a time. [`StreamingPlayer::start`] spawns a session
//! thread that opens the asset, prepares the output, pre-fills the ring and
//! starts the stream, then reports readiness back over a rendezvous channel.
//! After that the same thread acts as the producer until the stop signal fires.
//!
//! State moves `Idle → Opening → Streaming → Stopping → Idle`; a device switch
//! runs the old session down to `Idle` before the new one opens.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use lowhum_types::{PlayerState, PlayerStatus, StopReason};

use crate::backend::{AudioBackend, DeviceSelection, OutputRequest};
use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::playback::{BlockRenderer, RenderCounters};
use crate::queue::{RingWriter, calc_max_buffered_samples, sample_ring};
use crate::reader::AssetReader;
use crate::resample::StreamResampler;
use crate::signal::StopSignal;
use crate::status::PlayerStatusState;

/// What [`StreamingPlayer::start`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is streaming.
    Started,
    /// A live session already streams to the requested selection; nothing changed.
    AlreadyStreaming,
    /// The previous session was torn down and a new one streams to the new device.
    Switched,
}

/// View of the live session handed to the device watcher.
#[derive(Clone, Debug)]
pub struct SessionTicket {
    /// Resolved id of the device the session plays to.
    pub device_id: String,
    /// Whether the session was started on the system default.
    pub follow_default: bool,
    /// Host default output id when the session started.
    pub default_at_start: Option<String>,
    pub stop: StopSignal,
}

struct SessionHandle {
    id: u64,
    selection: DeviceSelection,
    ticket: SessionTicket,
    join: JoinHandle<()>,
}

pub struct StreamingPlayer<B: AudioBackend> {
    backend: Arc<B>,
    config: PlaybackConfig,
    state: Arc<AtomicU8>,
    status: Arc<Mutex<PlayerStatusState>>,
    session: Mutex<Option<SessionHandle>>,
    /// Id of the session allowed to publish state; `0` when none.
    current: Arc<AtomicU64>,
    next_id: AtomicU64,
}

impl<B: AudioBackend> StreamingPlayer<B> {
    pub fn new(backend: Arc<B>, config: PlaybackConfig) -> Self {
        Self {
            backend,
            config,
            state: Arc::new(AtomicU8::new(PlayerState::Idle.as_u8())),
            status: PlayerStatusState::shared(),
            session: Mutex::new(None),
            current: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start streaming `asset` to `selection`.
    ///
    /// Blocks until the session is streaming or has failed. Failures to open
    /// the asset or the device are returned here and never retried. The session
    /// slot is not held while waiting, so `stop` and the watcher stay responsive.
    pub fn start(
        &self,
        asset: &Path,
        selection: DeviceSelection,
    ) -> Result<StartOutcome, PlaybackError> {
        let (id, stop, ready_rx, switched) = {
            let mut slot = self.lock_session();
            reap_finished(&mut slot);

            let live_selection = slot
                .as_ref()
                .filter(|s| !s.ticket.stop.is_fired())
                .map(|s| s.selection.clone());
            if live_selection.as_ref() == Some(&selection) {
                return Ok(StartOutcome::AlreadyStreaming);
            }

            let devices = self.backend.output_devices()?;
            let target = selection
                .resolve(&devices)
                .cloned()
                .ok_or_else(|| PlaybackError::DeviceUnavailable(selection.to_string()))?;

            if let Some(old) = slot.take() {
                tracing::info!(from = %old.selection, to = %selection, "switching output device");
                teardown(old, StopReason::Stopped);
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let stop = StopSignal::new();
            let default_at_start = self.backend.default_output_id();
            self.current.store(id, Ordering::Release);
            self.state
                .store(PlayerState::Opening.as_u8(), Ordering::Release);
            tracing::info!(device = %target.name, device_id = %target.id, "opening playback session");

            let session = Session {
                id,
                asset: asset.to_path_buf(),
                selection: DeviceSelection::Id(target.id.clone()),
                backend: self.backend.clone(),
                config: self.config.clone(),
                state: self.state.clone(),
                status: self.status.clone(),
                current: self.current.clone(),
                stop: stop.clone(),
            };
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
            let join = thread::Builder::new()
                .name("lowhum-session".to_string())
                .spawn(move || session.run(ready_tx))
                .map_err(|e| {
                    self.abandon(id);
                    PlaybackError::Stream(format!("failed to spawn session thread: {e}"))
                })?;

            *slot = Some(SessionHandle {
                id,
                ticket: SessionTicket {
                    device_id: target.id,
                    follow_default: selection.follows_default(),
                    default_at_start,
                    stop: stop.clone(),
                },
                selection,
                join,
            });
            (id, stop, ready_rx, live_selection.is_some())
        };

        let timeout = Duration::from_millis(self.config.ready_timeout_ms.max(1));
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(if switched {
                StartOutcome::Switched
            } else {
                StartOutcome::Started
            }),
            Ok(Err(e)) => {
                if let Some(failed) = self.take_session(id) {
                    let _ = failed.join.join();
                }
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                // Detach: the thread notices the signal on its own.
                stop.fire(StopReason::Error);
                drop(self.take_session(id));
                self.abandon(id);
                tracing::error!(timeout_ms = timeout.as_millis() as u64, "session did not become ready");
                Err(PlaybackError::Stream("output did not start in time".to_string()))
            }
        }
    }

    /// Stop the live session, if any. Returns `true` when one was stopped.
    ///
    /// Returns once the stream and the asset file have been released.
    pub fn stop(&self) -> bool {
        let Some(session) = self.lock_session().take() else {
            return false;
        };
        let was_live = !session.ticket.stop.is_fired();
        teardown(session, StopReason::Stopped);
        if was_live {
            tracing::info!("playback stopped");
        }
        was_live
    }

    pub fn state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn status(&self) -> PlayerStatus {
        let state = self.state();
        match self.status.lock() {
            Ok(status) => status.snapshot(state),
            Err(_) => PlayerStatus {
                state,
                ..Default::default()
            },
        }
    }

    /// The live session, or `None` when idle or already signalled to stop.
    pub fn active_session(&self) -> Option<SessionTicket> {
        self.lock_session()
            .as_ref()
            .filter(|s| !s.ticket.stop.is_fired())
            .map(|s| s.ticket.clone())
    }

    /// Whether a session thread still exists (live, or winding down after a signal).
    pub fn has_session(&self) -> bool {
        let mut slot = self.lock_session();
        reap_finished(&mut slot);
        slot.is_some()
    }

    fn abandon(&self, id: u64) {
        if self
            .current
            .compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Ok(mut status) = self.status.lock() {
                status.clear_playback();
                status.end_reason = Some(StopReason::Error);
            }
            self.state.store(PlayerState::Idle.as_u8(), Ordering::Release);
        }
    }

    /// Remove session `id` from the slot unless another caller already took it.
    fn take_session(&self, id: u64) -> Option<SessionHandle> {
        let mut slot = self.lock_session();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            slot.take()
        } else {
            None
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: AudioBackend> Drop for StreamingPlayer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap_finished(slot: &mut Option<SessionHandle>) {
    if slot.as_ref().is_some_and(|s| s.join.is_finished()) {
        if let Some(done) = slot.take() {
            let _ = done.join.join();
        }
    }
}

fn teardown(session: SessionHandle, reason: StopReason) {
    session.ticket.stop.fire(reason);
    if session.join.join().is_err() {
        tracing::error!("playback session thread panicked");
    }
}

struct Session<B: AudioBackend> {
    id: u64,
    asset: PathBuf,
    selection: DeviceSelection,
    backend: Arc<B>,
    config: PlaybackConfig,
    state: Arc<AtomicU8>,
    status: Arc<Mutex<PlayerStatusState>>,
    current: Arc<AtomicU64>,
    stop: StopSignal,
}

impl<B: AudioBackend> Session<B> {
    fn run(self, ready: Sender<Result<(), PlaybackError>>) {
        let mut ready = Some(ready);
        let result = self.stream(&mut ready);
        let reason = match result {
            Ok(()) => self.stop.reason().unwrap_or(StopReason::Stopped),
            Err(e) => {
                if let Some(tx) = ready.take() {
                    tracing::warn!(error = %e, "playback session failed to open");
                    self.finish(None);
                    let _ = tx.send(Err(e));
                    return;
                }
                tracing::error!(error = %e, "playback session failed");
                self.stop.fire(StopReason::Error);
                self.stop.reason().unwrap_or(StopReason::Error)
            }
        };
        tracing::info!(reason = ?reason, "playback session ended");
        self.finish(Some(reason));
    }

    fn stream(
        &self,
        ready: &mut Option<Sender<Result<(), PlaybackError>>>,
    ) -> Result<(), PlaybackError> {
        let read_offset = Arc::new(AtomicU64::new(0));
        let asset_open = match self.status.lock() {
            Ok(status) => status.asset_open.clone(),
            Err(_) => return Err(PlaybackError::Stream("status lock poisoned".to_string())),
        };
        let reader = AssetReader::open(&self.asset, asset_open, read_offset.clone())?;
        let asset_rate = reader.sample_rate();
        let asset_channels = reader.channels();
        let asset_frames = reader.header().frames;

        let prepared = self.backend.prepare_output(
            &self.selection,
            OutputRequest {
                sample_rate: asset_rate,
                channels: asset_channels,
            },
        )?;
        let format = prepared.format().clone();
        let device = prepared.device().clone();

        let chunk_frames = self.config.chunk_frames.max(1);
        let resampler = if format.sample_rate != asset_rate {
            Some(StreamResampler::new(
                asset_rate,
                format.sample_rate,
                asset_channels as usize,
                chunk_frames,
            )?)
        } else {
            None
        };
        let resampling = resampler.is_some();

        let capacity = calc_max_buffered_samples(
            format.sample_rate,
            asset_channels as usize,
            self.config.buffer_seconds,
        );
        let (writer, consumer) = sample_ring(capacity, asset_channels as usize);
        let mut producer = Producer::new(reader, resampler, writer, chunk_frames);
        producer.fill()?;

        let counters = RenderCounters::default();
        let renderer = BlockRenderer::new(
            consumer,
            asset_channels,
            format.channels,
            format.callback_frames_hint(),
            self.stop.clone(),
            counters.clone(),
        );

        if self.is_current() {
            if let Ok(mut status) = self.status.lock() {
                status.device = Some(device.name.clone());
                status.device_id = Some(device.id.clone());
                status.asset_rate = Some(asset_rate);
                status.output_rate = Some(format.sample_rate);
                status.channels = Some(format.channels);
                status.resampling = Some(resampling);
                status.counters = Some(counters);
                status.read_offset = Some(read_offset);
                status.asset_frames = Some(asset_frames);
                status.end_reason = None;
            }
        }

        let output = prepared.start(renderer, self.stop.clone())?;
        self.set_state(PlayerState::Streaming);
        tracing::info!(
            device = %device.name,
            asset_rate_hz = asset_rate,
            output_rate_hz = format.sample_rate,
            channels = format.channels,
            resampling,
            "streaming"
        );
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }

        let sleep = Duration::from_millis(self.config.fill_sleep_ms.max(1));
        while !self.stop.is_fired() {
            if producer.fill()? == 0 {
                thread::sleep(sleep);
            }
        }

        self.set_state(PlayerState::Stopping);
        drop(output);
        drop(producer);
        Ok(())
    }

    fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.id
    }

    fn set_state(&self, state: PlayerState) {
        if self.is_current() {
            self.state.store(state.as_u8(), Ordering::Release);
        }
    }

    /// Publish the end of this session. Ignored once a newer session owns the state.
    fn finish(&self, reason: Option<StopReason>) {
        if !self.is_current() {
            return;
        }
        self.set_state(PlayerState::Stopping);
        if let Ok(mut status) = self.status.lock() {
            status.clear_playback();
            if reason.is_some() {
                status.end_reason = reason;
            }
        }
        self.set_state(PlayerState::Idle);
    }
}

/// Producer side of a session: reader → optional resampler → ring.
struct Producer {
    reader: AssetReader,
    resampler: Option<StreamResampler>,
    writer: RingWriter,
    block: Vec<f32>,
    /// Samples produced but not yet accepted by the ring.
    carry: Vec<f32>,
    carry_pos: usize,
}

impl Producer {
    fn new(
        reader: AssetReader,
        resampler: Option<StreamResampler>,
        writer: RingWriter,
        chunk_frames: usize,
    ) -> Self {
        let block = vec![0.0f32; chunk_frames * reader.channels() as usize];
        Self {
            reader,
            resampler,
            writer,
            block,
            carry: Vec::with_capacity(chunk_frames * 4),
            carry_pos: 0,
        }
    }

    /// Top the ring up. Returns the number of samples pushed.
    fn fill(&mut self) -> Result<usize, PlaybackError> {
        let mut pushed = 0usize;
        loop {
            if self.carry_pos < self.carry.len() {
                let n = self.writer.push_frames(&self.carry[self.carry_pos..]);
                self.carry_pos += n;
                pushed += n;
                if self.carry_pos < self.carry.len() {
                    return Ok(pushed);
                }
            }

            self.reader.read_block(&mut self.block)?;
            self.carry.clear();
            self.carry_pos = 0;
            match self.resampler.as_mut() {
                Some(rs) => self.carry.extend_from_slice(rs.process(&self.block)?),
                None => self.carry.extend_from_slice(&self.block),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;
    use crate::reader::tests::{ramp_asset, temp_dir};
    use noise_gen::AssetError;
    use std::time::Instant;

    fn config() -> PlaybackConfig {
        PlaybackConfig {
            chunk_frames: 64,
            buffer_seconds: 0.1,
            fill_sleep_ms: 1,
            ready_timeout_ms: 5_000,
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn setup(tag: &str) -> (Arc<FakeBackend>, StreamingPlayer<FakeBackend>, PathBuf) {
        let dir = temp_dir(tag);
        let asset = ramp_asset(&dir, 8_000, 1, 400);
        let backend = Arc::new(FakeBackend::new(vec![
            FakeBackend::device("builtin", "Built-in Output", 8_000),
            FakeBackend::device("usb", "USB DAC", 8_000),
        ]));
        backend.set_default(Some("builtin"));
        let player = StreamingPlayer::new(backend.clone(), config());
        (backend, player, asset)
    }

    #[test]
    fn unknown_device_creates_no_session() {
        let (_backend, player, asset) = setup("player-unknown");
        let err = player
            .start(&asset, DeviceSelection::Id("hdmi".to_string()))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::DeviceUnavailable(_)));
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(player.active_session().is_none());
        assert!(!player.status().asset_open);
    }

    #[test]
    fn streams_the_asset_and_wraps() {
        let (backend, player, asset) = setup("player-stream");
        let outcome = player.start(&asset, DeviceSelection::SystemDefault).unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(player.state(), PlayerState::Streaming);

        let status = player.status();
        assert_eq!(status.device_id.as_deref(), Some("builtin"));
        assert_eq!(status.resampling, Some(false));
        assert!(status.asset_open);

        // Pull more than one full asset length to cross the end of file.
        let mut pulled = Vec::new();
        assert!(wait_for(|| {
            if let Some(block) = backend.pull(100) {
                pulled.extend(block);
            }
            pulled.len() >= 600
        }));
        for (i, v) in pulled.iter().take(600).enumerate() {
            let expected = ((i % 400) % 100) as f32 / 200.0;
            assert!((v - expected).abs() < 1e-3, "sample {i}: {v} vs {expected}");
        }

        assert!(player.stop());
        assert_eq!(player.state(), PlayerState::Idle);
        let status = player.status();
        assert!(!status.asset_open);
        assert_eq!(status.end_reason, Some(StopReason::Stopped));
        assert!(!backend.has_active_output());
    }

    #[test]
    fn second_start_on_same_selection_is_noop() {
        let (_backend, player, asset) = setup("player-noop");
        player.start(&asset, DeviceSelection::SystemDefault).unwrap();
        assert_eq!(
            player.start(&asset, DeviceSelection::SystemDefault).unwrap(),
            StartOutcome::AlreadyStreaming
        );
        player.stop();
    }

    #[test]
    fn start_on_other_device_switches() {
        let (backend, player, asset) = setup("player-switch");
        player.start(&asset, DeviceSelection::SystemDefault).unwrap();
        let first = player.active_session().unwrap();

        let outcome = player
            .start(&asset, DeviceSelection::Id("usb".to_string()))
            .unwrap();
        assert_eq!(outcome, StartOutcome::Switched);
        assert_eq!(first.stop.reason(), Some(StopReason::Stopped));

        let ticket = player.active_session().unwrap();
        assert_eq!(ticket.device_id, "usb");
        assert!(!ticket.follow_default);
        assert_eq!(backend.active_device().as_deref(), Some("usb"));
        assert_eq!(player.state(), PlayerState::Streaming);
        player.stop();
    }

    #[test]
    fn session_slot_is_free_while_opening() {
        let (backend, player, asset) = setup("player-opening");
        backend.set_prepare_delay(Duration::from_millis(400));
        thread::scope(|scope| {
            let starting = scope.spawn(|| player.start(&asset, DeviceSelection::SystemDefault));
            assert!(wait_for(|| player.state() == PlayerState::Opening));

            let began = Instant::now();
            let ticket = player.active_session();
            assert!(began.elapsed() < Duration::from_millis(200));
            assert_eq!(ticket.map(|t| t.device_id).as_deref(), Some("builtin"));
            assert_eq!(starting.join().unwrap().unwrap(), StartOutcome::Started);
        });
        assert_eq!(player.state(), PlayerState::Streaming);
        assert!(player.stop());
    }

    #[test]
    fn device_rate_mismatch_enables_resampling() {
        let dir = temp_dir("player-resample");
        let asset = ramp_asset(&dir, 8_000, 1, 400);
        let backend = Arc::new(FakeBackend::new(vec![FakeBackend::device(
            "dac", "USB DAC", 16_000,
        )]));
        backend.set_default(Some("dac"));
        let player = StreamingPlayer::new(backend.clone(), config());

        player.start(&asset, DeviceSelection::SystemDefault).unwrap();
        let status = player.status();
        assert_eq!(status.asset_rate, Some(8_000));
        assert_eq!(status.output_rate, Some(16_000));
        assert_eq!(status.resampling, Some(true));
        assert!(wait_for(|| backend.pull(64).is_some()));
        player.stop();
    }

    #[test]
    fn corrupt_asset_is_reported_from_start() {
        let (_backend, player, _) = setup("player-corrupt");
        let dir = temp_dir("player-corrupt-file");
        let bad = dir.join("bad.wav");
        std::fs::write(&bad, b"not a wav file at all").unwrap();

        let err = player.start(&bad, DeviceSelection::SystemDefault).unwrap_err();
        assert!(matches!(err, PlaybackError::Asset(AssetError::Corrupt { .. })));
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(player.active_session().is_none());
        assert!(!player.has_session());
    }

    #[test]
    fn fired_signal_ends_session_and_releases_file() {
        let (backend, player, asset) = setup("player-signal");
        player.start(&asset, DeviceSelection::SystemDefault).unwrap();
        let ticket = player.active_session().unwrap();
        assert!(ticket.stop.fire(StopReason::DeviceLost));

        assert!(wait_for(|| player.state() == PlayerState::Idle));
        let status = player.status();
        assert!(!status.asset_open);
        assert_eq!(status.end_reason, Some(StopReason::DeviceLost));
        assert!(wait_for(|| !backend.has_active_output()));
        assert!(player.active_session().is_none());
        assert!(!player.stop());
    }
}
