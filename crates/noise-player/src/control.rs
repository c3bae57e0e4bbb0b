//! Control surface for the CLI and tray layers.
//!
//! Ties the asset cache to the player: generation always finishes before a
//! session opens the file, and is refused while one is open.

use std::sync::Arc;
use std::time::Duration;

use lowhum_types::{DeviceDescriptor, PlayerStatus};
use noise_gen::{AssetCache, AssetError, CacheOutcome};
use thiserror::Error;

use crate::backend::{AudioBackend, DeviceSelection};
use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::player::{StartOutcome, StreamingPlayer};
use crate::watcher::{DeviceWatcher, WatcherHandle, spawn_watcher};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    /// The asset cannot be regenerated while a session has it open.
    #[error("player is busy; stop playback before regenerating the asset")]
    PlayerBusy,
}

pub struct Controller<B: AudioBackend> {
    backend: Arc<B>,
    cache: AssetCache,
    player: Arc<StreamingPlayer<B>>,
}

impl<B: AudioBackend> Controller<B> {
    pub fn new(backend: Arc<B>, cache: AssetCache, config: PlaybackConfig) -> Self {
        let player = Arc::new(StreamingPlayer::new(backend.clone(), config));
        Self {
            backend,
            cache,
            player,
        }
    }

    pub fn player(&self) -> &Arc<StreamingPlayer<B>> {
        &self.player
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// Resolve the device, make sure the asset exists, then stream it to
    /// `device_id` (or the default).
    pub fn start(&self, device_id: Option<&str>) -> Result<StartOutcome, ControlError> {
        let selection = DeviceSelection::from_option(device_id);
        let devices = self.backend.output_devices()?;
        if selection.resolve(&devices).is_none() {
            return Err(PlaybackError::DeviceUnavailable(selection.to_string()).into());
        }
        if self.player.active_session().is_none() {
            // A signalled session may still be draining with the file open.
            self.player.stop();
            let outcome = self.cache.ensure()?;
            if outcome.was_generated() {
                tracing::info!(path = %self.cache.path().display(), "asset generated");
            }
        }
        Ok(self.player.start(self.cache.path(), selection)?)
    }

    pub fn stop(&self) -> bool {
        self.player.stop()
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, ControlError> {
        Ok(self.backend.output_devices()?)
    }

    /// Reuse a valid asset, or build one. `force` always rebuilds.
    pub fn generate(&self, force: bool) -> Result<CacheOutcome, ControlError> {
        if self.player.has_session() {
            return Err(ControlError::PlayerBusy);
        }
        if force {
            Ok(CacheOutcome::Generated(self.cache.regenerate()?))
        } else {
            Ok(self.cache.ensure()?)
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.player.status()
    }

    /// Build and spawn a watcher for this controller's player.
    pub fn watch(&self, interval: Duration) -> WatcherHandle {
        spawn_watcher(
            DeviceWatcher::new(self.backend.clone(), self.player.clone()),
            interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;
    use crate::reader::tests::temp_dir;
    use lowhum_types::PlayerState;
    use noise_gen::GenerationSpec;

    fn controller(tag: &str) -> (Arc<FakeBackend>, Controller<FakeBackend>) {
        let spec = GenerationSpec {
            sample_rate: 8_000,
            channels: 1,
            duration_secs: 2.0,
            segment_secs: 2.0,
            integration_secs: 0.5,
            normalize_chunk_secs: 0.5,
            boundary_smooth_secs: 0.05,
            segment_crossfade_secs: 0.25,
            loop_crossfade_secs: 0.5,
            seed: Some(5),
            ..GenerationSpec::default()
        };
        let cache = AssetCache::new(temp_dir(tag).join("asset.wav"), spec);
        let backend = Arc::new(FakeBackend::new(vec![FakeBackend::device(
            "builtin",
            "Built-in Output",
            8_000,
        )]));
        backend.set_default(Some("builtin"));
        let config = PlaybackConfig {
            chunk_frames: 64,
            buffer_seconds: 0.05,
            fill_sleep_ms: 1,
            ready_timeout_ms: 5_000,
        };
        let controller = Controller::new(backend.clone(), cache, config);
        (backend, controller)
    }

    #[test]
    fn start_generates_missing_asset_first() {
        let (_backend, ctl) = controller("ctl-start");
        assert!(!ctl.cache().path().exists());
        assert_eq!(ctl.start(None).unwrap(), StartOutcome::Started);
        assert!(ctl.cache().path().exists());
        assert_eq!(ctl.status().state, PlayerState::Streaming);
        assert!(ctl.stop());
        assert!(!ctl.stop());
    }

    #[test]
    fn unknown_device_is_typed_error() {
        let (_backend, ctl) = controller("ctl-unknown");
        let err = ctl.start(Some("missing")).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Playback(PlaybackError::DeviceUnavailable(_))
        ));
        assert_eq!(ctl.status().state, PlayerState::Idle);
        assert!(!ctl.player().has_session());
        // Nothing is rendered for a device that is not there.
        assert!(!ctl.cache().path().exists());
    }

    #[test]
    fn restart_after_halt_waits_for_old_session() {
        let (_backend, ctl) = controller("ctl-restart");
        ctl.start(None).unwrap();
        let ticket = ctl.player().active_session().unwrap();
        assert!(ticket.stop.fire(lowhum_types::StopReason::DeviceLost));
        std::fs::write(ctl.cache().path(), b"truncated").unwrap();

        assert_eq!(ctl.start(None).unwrap(), StartOutcome::Started);
        assert_eq!(ctl.status().state, PlayerState::Streaming);
        assert!(ctl.cache().validate().is_ok());
        assert!(ctl.stop());
        assert!(!ctl.player().has_session());
    }

    #[test]
    fn generate_reuses_unless_forced() {
        let (_backend, ctl) = controller("ctl-generate");
        assert!(ctl.generate(false).unwrap().was_generated());
        assert!(!ctl.generate(false).unwrap().was_generated());
        assert!(ctl.generate(true).unwrap().was_generated());
    }

    #[test]
    fn generate_refused_while_playing() {
        let (_backend, ctl) = controller("ctl-busy");
        ctl.start(None).unwrap();
        assert!(matches!(ctl.generate(true), Err(ControlError::PlayerBusy)));
        ctl.stop();
        assert!(!ctl.generate(false).unwrap().was_generated());
    }

    #[test]
    fn list_devices_surfaces_enumeration_errors() {
        let (backend, ctl) = controller("ctl-list");
        assert_eq!(ctl.list_devices().unwrap().len(), 1);
        backend.set_fail_enumerate(true);
        assert!(matches!(
            ctl.list_devices(),
            Err(ControlError::Playback(PlaybackError::Enumerate(_)))
        ));
    }
}
