//! In-memory [`AudioBackend`] for tests.
//!
//! Devices are a mutable list; a started output parks its renderer in a shared
//! slot and tests pull audio from it by hand instead of a hardware callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};

use lowhum_types::DeviceDescriptor;

use crate::backend::{
    ActiveOutput, AudioBackend, DeviceSelection, OutputFormat, OutputRequest, PreparedOutput,
};
use crate::error::PlaybackError;
use crate::playback::BlockRenderer;
use crate::signal::StopSignal;

type RendererSlot = Arc<Mutex<Option<(String, BlockRenderer)>>>;

#[derive(Default)]
pub struct FakeBackend {
    devices: Mutex<Vec<DeviceDescriptor>>,
    fail_enumerate: AtomicBool,
    prepare_delay_ms: AtomicU64,
    active: RendererSlot,
}

impl FakeBackend {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn device(id: &str, name: &str, rate: u32) -> DeviceDescriptor {
        DeviceDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            is_default: false,
            max_output_channels: 2,
            min_rate: rate,
            max_rate: rate,
            default_rate: Some(rate),
        }
    }

    pub fn set_default(&self, id: Option<&str>) {
        let mut devices = self.devices.lock().unwrap();
        for d in devices.iter_mut() {
            d.is_default = Some(d.id.as_str()) == id;
        }
    }

    pub fn add_device(&self, device: DeviceDescriptor) {
        self.devices.lock().unwrap().push(device);
    }

    /// Remove a device, as an unplug would.
    pub fn remove_device(&self, id: &str) {
        self.devices.lock().unwrap().retain(|d| d.id != id);
    }

    pub fn set_fail_enumerate(&self, fail: bool) {
        self.fail_enumerate.store(fail, Ordering::Relaxed);
    }

    /// Make `prepare_output` take this long, like a slow device open.
    pub fn set_prepare_delay(&self, delay: Duration) {
        self.prepare_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn has_active_output(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    pub fn active_device(&self) -> Option<String> {
        self.active.lock().unwrap().as_ref().map(|(id, _)| id.clone())
    }

    /// Run the active renderer for `frames` output frames.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        let mut slot = self.active.lock().unwrap();
        let (_, renderer) = slot.as_mut()?;
        let channels = renderer.dst_channels();
        let mut out = vec![0.0f32; frames * channels];
        renderer.render(&mut out);
        Some(out)
    }
}

impl AudioBackend for FakeBackend {
    fn output_devices(&self) -> Result<Vec<DeviceDescriptor>, PlaybackError> {
        if self.fail_enumerate.load(Ordering::Relaxed) {
            return Err(PlaybackError::Enumerate("host unavailable".to_string()));
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    fn default_output_id(&self) -> Option<String> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.is_default)
            .map(|d| d.id.clone())
    }

    fn prepare_output(
        &self,
        selection: &DeviceSelection,
        request: OutputRequest,
    ) -> Result<Box<dyn PreparedOutput>, PlaybackError> {
        let delay = self.prepare_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let devices = self.devices.lock().unwrap();
        let device = selection
            .resolve(&devices)
            .cloned()
            .ok_or_else(|| PlaybackError::DeviceUnavailable(selection.to_string()))?;
        let format = OutputFormat {
            sample_rate: device.default_rate.unwrap_or(request.sample_rate),
            channels: request.channels.min(device.max_output_channels).max(1),
            buffer_frames: Some(256),
        };
        Ok(Box::new(FakePrepared {
            device,
            format,
            slot: self.active.clone(),
        }))
    }
}

struct FakePrepared {
    device: DeviceDescriptor,
    format: OutputFormat,
    slot: RendererSlot,
}

impl PreparedOutput for FakePrepared {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn format(&self) -> &OutputFormat {
        &self.format
    }

    fn start(
        self: Box<Self>,
        renderer: BlockRenderer,
        _stop: StopSignal,
    ) -> Result<Box<dyn ActiveOutput>, PlaybackError> {
        *self.slot.lock().unwrap() = Some((self.device.id.clone(), renderer));
        Ok(Box::new(FakeActive { slot: self.slot }))
    }
}

struct FakeActive {
    slot: RendererSlot,
}

impl ActiveOutput for FakeActive {}

impl Drop for FakeActive {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}
