//! Device watcher.
//!
//! Polls the backend's output list on a fixed interval, logs what changed, and
//! fires the live session's stop signal when its device disappears or (when the
//! session follows the system default) the default output moves elsewhere.
//! It never touches player state directly; the session thread reacts to the
//! signal on its own.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use lowhum_types::{DeviceDescriptor, StopReason};

use crate::backend::AudioBackend;
use crate::player::{SessionTicket, StreamingPlayer};

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Notifications for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    DevicesChanged {
        added: Vec<DeviceDescriptor>,
        removed: Vec<DeviceDescriptor>,
    },
    /// The watcher stopped the live session.
    PlaybackHalted { reason: StopReason },
}

/// Result of one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub added: Vec<DeviceDescriptor>,
    pub removed: Vec<DeviceDescriptor>,
    /// Set when this poll fired the session's stop signal.
    pub halted: Option<StopReason>,
    /// Enumeration failed; treated as "no change".
    pub enumerate_failed: bool,
}

impl PollOutcome {
    pub fn devices_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

pub struct DeviceWatcher<B: AudioBackend> {
    backend: Arc<B>,
    player: Arc<StreamingPlayer<B>>,
    known: Option<BTreeMap<String, DeviceDescriptor>>,
}

impl<B: AudioBackend> DeviceWatcher<B> {
    pub fn new(backend: Arc<B>, player: Arc<StreamingPlayer<B>>) -> Self {
        Self {
            backend,
            player,
            known: None,
        }
    }

    /// Run one poll cycle. The first successful poll only records a baseline.
    pub fn poll(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let devices = match self.backend.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "device enumeration failed; assuming no change");
                outcome.enumerate_failed = true;
                return outcome;
            }
        };
        let current: BTreeMap<String, DeviceDescriptor> = devices
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        if let Some(known) = self.known.as_ref() {
            outcome.added = current
                .iter()
                .filter(|(id, _)| !known.contains_key(*id))
                .map(|(_, d)| d.clone())
                .collect();
            outcome.removed = known
                .iter()
                .filter(|(id, _)| !current.contains_key(*id))
                .map(|(_, d)| d.clone())
                .collect();
            for d in &outcome.added {
                tracing::info!(device = %d.name, id = %d.id, "output device added");
            }
            for d in &outcome.removed {
                tracing::info!(device = %d.name, id = %d.id, "output device removed");
            }
        }
        tracing::debug!(
            devices = current.len(),
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            "device poll"
        );

        if let Some(session) = self.player.active_session() {
            let default_now = current
                .values()
                .find(|d| d.is_default)
                .map(|d| d.id.clone());
            let reason = if !current.contains_key(&session.device_id) {
                Some(StopReason::DeviceLost)
            } else if session.follow_default && default_moved(&session, default_now.as_deref()) {
                Some(StopReason::DefaultChanged)
            } else {
                None
            };
            if let Some(reason) = reason {
                if session.stop.fire(reason) {
                    tracing::info!(
                        device_id = %session.device_id,
                        reason = ?reason,
                        "halting playback"
                    );
                    outcome.halted = Some(reason);
                }
            }
        }

        self.known = Some(current);
        outcome
    }
}

/// A host that reports no default output is not a default change.
fn default_moved(session: &SessionTicket, default_now: Option<&str>) -> bool {
    let Some(now) = default_now else {
        return false;
    };
    match session.default_at_start.as_deref() {
        Some(start) => now != start,
        None => now != session.device_id,
    }
}

/// Handle to a running watcher thread.
pub struct WatcherHandle {
    shutdown: Option<Sender<()>>,
    events: Receiver<WatchEvent>,
    join: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn events(&self) -> &Receiver<WatchEvent> {
        &self.events
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        // Dropping the sender disconnects the watcher's receiver.
        self.shutdown.take();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("device watcher thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Poll on a background thread every `interval` until the handle is stopped.
pub fn spawn_watcher<B: AudioBackend>(
    mut watcher: DeviceWatcher<B>,
    interval: Duration,
) -> WatcherHandle {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let interval = interval.max(Duration::from_millis(10));

    let join = thread::Builder::new()
        .name("lowhum-watcher".to_string())
        .spawn(move || {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "device watcher started");
            loop {
                let outcome = watcher.poll();
                if outcome.devices_changed() {
                    let _ = event_tx.send(WatchEvent::DevicesChanged {
                        added: outcome.added,
                        removed: outcome.removed,
                    });
                }
                if let Some(reason) = outcome.halted {
                    let _ = event_tx.send(WatchEvent::PlaybackHalted { reason });
                }
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!("device watcher stopped");
        });

    let join = match join {
        Ok(join) => Some(join),
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn device watcher");
            None
        }
    };
    WatcherHandle {
        shutdown: Some(shutdown_tx),
        events: event_rx,
        join,
    }
}
